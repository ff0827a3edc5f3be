use anyhow::{Context, Result, bail, ensure};
use regex::Regex;
use reqwest::Url;
use std::{fmt, path::PathBuf, sync::LazyLock};
use tessera_core::TileCoord;

const ARCHIVE_SCHEME: &str = "pmtiles://";

static TILE_SUFFIX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^(.+)/(\d+)/(\d+)/(\d+)$").expect("valid tile suffix pattern"));

/// The object storage service a bucket lives in.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum StoreService {
	/// Amazon S3 or any S3-compatible service.
	S3,
	/// Google Cloud Storage.
	Gcs,
}

impl StoreService {
	/// The URI scheme used when naming objects of this service.
	pub fn scheme(self) -> &'static str {
		match self {
			StoreService::S3 => "s3",
			StoreService::Gcs => "gs",
		}
	}
}

impl fmt::Display for StoreService {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.scheme())
	}
}

const STORE_SCHEMES: [(&str, StoreService); 3] = [
	("s3://", StoreService::S3),
	("objectstore://", StoreService::S3),
	("gs://", StoreService::Gcs),
];

/// Where a resource lives, as decided by its URI scheme.
#[derive(Clone, PartialEq)]
pub enum ResourceLocation {
	/// A local file, given as a plain path or a `file://` URI.
	Path(PathBuf),
	Http(Url),
	/// `s3://bucket/key`, `objectstore://bucket/key` or `gs://bucket/key`.
	ObjectStore {
		service: StoreService,
		bucket: String,
		key: String,
	},
	/// `pmtiles://<inner>/{z}/{x}/{y}`: one tile of the archive at `archive`.
	Archive {
		archive: String,
		inner: Box<ResourceLocation>,
		coord: TileCoord,
	},
}

impl ResourceLocation {
	pub fn parse(uri: &str) -> Result<ResourceLocation> {
		if let Some(rest) = uri.strip_prefix(ARCHIVE_SCHEME) {
			return Self::parse_archive(rest).with_context(|| format!("malformed archive URI '{uri}'"));
		}
		if let Some(path) = uri.strip_prefix("file://") {
			ensure!(!path.is_empty(), "empty file URI");
			return Ok(ResourceLocation::Path(PathBuf::from(path)));
		}
		if uri.starts_with("http://") || uri.starts_with("https://") {
			return Ok(ResourceLocation::Http(
				Url::parse(uri).with_context(|| format!("malformed URL '{uri}'"))?,
			));
		}
		for (scheme, service) in STORE_SCHEMES {
			if let Some(rest) = uri.strip_prefix(scheme) {
				let Some((bucket, key)) = rest.split_once('/').filter(|(b, k)| !b.is_empty() && !k.is_empty()) else {
					bail!("object storage URI '{uri}' must look like {scheme}bucket/key");
				};
				return Ok(ResourceLocation::ObjectStore {
					service,
					bucket: bucket.to_string(),
					key: key.to_string(),
				});
			}
		}
		if let Some((scheme, _)) = uri.split_once("://") {
			bail!("unsupported scheme '{scheme}' in '{uri}'");
		}
		ensure!(!uri.is_empty(), "empty resource URI");
		Ok(ResourceLocation::Path(PathBuf::from(uri)))
	}

	fn parse_archive(rest: &str) -> Result<ResourceLocation> {
		let Some(captures) = TILE_SUFFIX.captures(rest) else {
			bail!("expected a /{{z}}/{{x}}/{{y}} suffix");
		};
		let archive = captures[1].to_string();
		let level: u8 = captures[2].parse().context("zoom level out of range")?;
		let x: u32 = captures[3].parse().context("x out of range")?;
		let y: u32 = captures[4].parse().context("y out of range")?;

		let inner = ResourceLocation::parse(&archive)?;
		if let ResourceLocation::Archive { .. } = inner {
			bail!("archives cannot be nested");
		}

		Ok(ResourceLocation::Archive {
			archive,
			inner: Box::new(inner),
			coord: TileCoord::new(level, x, y)?,
		})
	}
}

impl fmt::Debug for ResourceLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceLocation::Path(path) => write!(f, "Path({})", path.display()),
			ResourceLocation::Http(url) => write!(f, "Http({url})"),
			ResourceLocation::ObjectStore { service, bucket, key } => write!(f, "ObjectStore({service}://{bucket}/{key})"),
			ResourceLocation::Archive { inner, coord, .. } => write!(f, "Archive({inner:?} @ {coord:?})"),
		}
	}
}
