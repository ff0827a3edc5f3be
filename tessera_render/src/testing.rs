//! A deterministic stand-in for the render engine (feature `test`).
//!
//! [`MockEngine`] understands just enough of a style document to request its
//! resources: every URL in `sources.*.tiles` (with `{z}`, `{x}` and `{y}`
//! filled in from the camera) and `sprite` + `.png`. Its "image" is a text
//! report of the camera and of every resource it received, so tests can check
//! exactly what the interceptor handed over.
//!
//! `metadata."mock:fail": true` in a style makes every render fail,
//! `metadata."mock:reject": true` makes loading the style fail.

use crate::engine::{EngineMap, RenderEngine, RenderMode, RenderOptions, ResourceHandler, ResourceRequest};
use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::{
	f64::consts::PI,
	fmt::Write,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
use tessera_core::Blob;
use tokio::sync::oneshot;

/// Counters shared by a [`MockEngine`] and all of its maps.
#[derive(Debug, Default)]
pub struct MockStats {
	created: AtomicUsize,
	released: AtomicUsize,
	renders: AtomicUsize,
	active: AtomicUsize,
	max_active: AtomicUsize,
}

impl MockStats {
	pub fn created(&self) -> usize {
		self.created.load(Ordering::SeqCst)
	}

	pub fn released(&self) -> usize {
		self.released.load(Ordering::SeqCst)
	}

	pub fn renders(&self) -> usize {
		self.renders.load(Ordering::SeqCst)
	}

	/// Highest number of renders that were in flight at the same time.
	pub fn max_active(&self) -> usize {
		self.max_active.load(Ordering::SeqCst)
	}
}

#[derive(Clone, Debug, Default)]
pub struct MockEngine {
	stats: Arc<MockStats>,
	render_delay: Duration,
}

impl MockEngine {
	pub fn new() -> MockEngine {
		MockEngine::default()
	}

	/// Every render sleeps this long after its resources arrived.
	#[must_use]
	pub fn with_render_delay(mut self, delay: Duration) -> MockEngine {
		self.render_delay = delay;
		self
	}

	pub fn stats(&self) -> Arc<MockStats> {
		self.stats.clone()
	}
}

impl RenderEngine for MockEngine {
	fn create_map(&self, mode: RenderMode, handler: Arc<dyn ResourceHandler>) -> Result<Box<dyn EngineMap>> {
		self.stats.created.fetch_add(1, Ordering::SeqCst);
		Ok(Box::new(MockMap {
			mode,
			handler,
			style: None,
			stats: self.stats.clone(),
			render_delay: self.render_delay,
			released: false,
		}))
	}
}

struct MockMap {
	mode: RenderMode,
	handler: Arc<dyn ResourceHandler>,
	style: Option<Value>,
	stats: Arc<MockStats>,
	render_delay: Duration,
	released: bool,
}

impl MockMap {
	fn flag(&self, name: &str) -> bool {
		self
			.style
			.as_ref()
			.and_then(|s| s.pointer(&format!("/metadata/mock:{name}")))
			.and_then(Value::as_bool)
			.unwrap_or(false)
	}

	fn resource_urls(&self, options: &RenderOptions) -> Vec<String> {
		let Some(style) = &self.style else {
			return Vec::new();
		};
		let level = options.zoom.floor().clamp(0.0, 30.0) as u8;
		let (x, y) = lonlat_to_tile(options.center, level);

		let mut urls = Vec::new();
		if let Some(sources) = style.get("sources").and_then(Value::as_object) {
			for source in sources.values() {
				let templates = source.get("tiles").and_then(Value::as_array).into_iter().flatten();
				for template in templates.filter_map(Value::as_str) {
					urls.push(
						template
							.replace("{z}", &level.to_string())
							.replace("{x}", &x.to_string())
							.replace("{y}", &y.to_string()),
					);
				}
			}
		}
		if let Some(sprite) = style.get("sprite").and_then(Value::as_str) {
			urls.push(format!("{sprite}.png"));
		}
		urls
	}
}

#[async_trait]
impl EngineMap for MockMap {
	fn load_style(&mut self, style: &str) -> Result<()> {
		self.style = Some(serde_json::from_str(style).context("mock engine cannot parse style")?);
		ensure!(!self.flag("reject"), "style rejected by mock engine");
		Ok(())
	}

	async fn render(&mut self, options: &RenderOptions) -> Result<Blob> {
		ensure!(!self.released, "map already released");
		ensure!(self.style.is_some(), "no style loaded");

		let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
		self.stats.max_active.fetch_max(active, Ordering::SeqCst);
		self.stats.renders.fetch_add(1, Ordering::SeqCst);
		let result = self.render_report(options).await;
		self.stats.active.fetch_sub(1, Ordering::SeqCst);
		result
	}

	fn release(&mut self) {
		if !self.released {
			self.released = true;
			self.stats.released.fetch_add(1, Ordering::SeqCst);
		}
	}
}

impl MockMap {
	async fn render_report(&self, options: &RenderOptions) -> Result<Blob> {
		let urls = self.resource_urls(options);
		let pending = urls.iter().map(|url| {
			let (tx, rx) = oneshot::channel();
			self.handler.request(
				ResourceRequest::new(url.as_str()),
				Box::new(move |blob| {
					let _ = tx.send(blob);
				}),
			);
			rx
		});
		let responses = join_all(pending.collect::<Vec<_>>()).await;

		if !self.render_delay.is_zero() {
			tokio::time::sleep(self.render_delay).await;
		}
		if self.flag("fail") {
			bail!("mock engine failed to render");
		}

		let mut report = format!(
			"{} zoom={} size={}x{} ratio={} center={:.5},{:.5}\n",
			self.mode, options.zoom, options.width, options.height, options.ratio, options.center[0], options.center[1]
		);
		for (url, response) in urls.iter().zip(responses) {
			let blob = response.with_context(|| format!("no response for '{url}'"))?;
			writeln!(report, "{url} {}", blob.len())?;
		}
		Ok(Blob::from(report))
	}
}

fn lonlat_to_tile([lon, lat]: [f64; 2], level: u8) -> (u32, u32) {
	let n = f64::from(1u32 << level);
	let x = ((lon + 180.0) / 360.0 * n).floor();
	let lat = lat.to_radians();
	let y = ((1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n).floor();
	(x.clamp(0.0, n - 1.0) as u32, y.clamp(0.0, n - 1.0) as u32)
}
