use super::ByteRangeBackend;
use anyhow::{Result, anyhow, bail, ensure};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use reqwest::{Client, StatusCode, Url, header};
use std::{sync::LazyLock, time::Duration};
use tessera_core::{Blob, ByteRange};
use tokio::time::sleep;

/// Reads ranges of a remote file with HTTP `Range` requests.
#[derive(Debug)]
pub struct HttpBackend {
	client: Client,
	name: String,
	url: Url,
	max_retries: u32,
}

impl HttpBackend {
	pub fn new(client: Client, url: Url, max_retries: u32) -> Result<HttpBackend> {
		match url.scheme() {
			"http" | "https" => (),
			other => bail!("unsupported URL scheme '{other}' in '{url}', expected 'http' or 'https'"),
		}

		Ok(HttpBackend {
			client,
			name: url.to_string(),
			url,
			max_retries,
		})
	}

	async fn read_range(&self, range: ByteRange) -> Result<Blob> {
		let request_range = range.as_http_header();

		for attempt in 0..=self.max_retries {
			if attempt > 0 {
				let backoff = Duration::from_millis(250 << (attempt - 1));
				log::warn!(
					"retry {attempt}/{} reading range {range} from '{}', waiting {backoff:?}",
					self.max_retries,
					self.url
				);
				sleep(backoff).await;
			}

			let request = self.client.get(self.url.clone()).header(header::RANGE, &request_range);
			let response = match request.send().await {
				Ok(r) => r,
				Err(e) if is_retryable(&e) && attempt < self.max_retries => {
					log::warn!("retryable error: {e}");
					continue;
				}
				Err(e) => return Err(e.into()),
			};

			if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::RANGE_NOT_SATISFIABLE) {
				log::debug!("'{}' answered {} for range {range}", self.url, response.status());
				return Ok(Blob::new_empty());
			}
			ensure!(
				response.status() == StatusCode::PARTIAL_CONTENT,
				"expected HTTP 206 (Partial Content), got {}",
				response.status()
			);

			let content_range = response
				.headers()
				.get(header::CONTENT_RANGE)
				.ok_or_else(|| anyhow!("response is missing Content-Range header"))?
				.to_str()?;
			check_content_range(content_range, range)?;

			let bytes = match response.bytes().await {
				Ok(b) => b,
				Err(e) if is_retryable(&e) && attempt < self.max_retries => {
					log::warn!("retryable error reading response body: {e}");
					continue;
				}
				Err(e) => return Err(e.into()),
			};

			return Ok(Blob::from(&*bytes));
		}

		bail!("request failed after {} retries", self.max_retries)
	}
}

fn is_retryable(err: &reqwest::Error) -> bool {
	err.is_connect() || err.is_timeout() || err.is_body()
}

fn check_content_range(content_range: &str, range: ByteRange) -> Result<()> {
	static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
		RegexBuilder::new(r"^bytes (\d+)-(\d+)/(\d+|\*)$")
			.case_insensitive(true)
			.build()
			.unwrap()
	});

	let caps = RE_RANGE
		.captures(content_range)
		.ok_or_else(|| anyhow!("unexpected Content-Range '{content_range}'"))?;
	let start: u64 = caps[1].parse()?;
	let end: u64 = caps[2].parse()?;

	ensure!(
		start == range.offset,
		"Content-Range start mismatch: expected {}, got {start}",
		range.offset
	);
	let expected_end = range.offset.saturating_add(range.length) - 1;
	ensure!(
		end == expected_end,
		"Content-Range end mismatch: expected {expected_end}, got {end}"
	);
	Ok(())
}

#[async_trait]
impl ByteRangeBackend for HttpBackend {
	fn identify(&self) -> &str {
		&self.name
	}

	async fn read(&self, offset: u64, length: u64) -> Result<Blob> {
		if length == 0 {
			return Ok(Blob::new_empty());
		}
		let range = ByteRange::new(offset, length);
		self
			.read_range(range)
			.await
			.map_err(|e| e.context(format!("reading range {range} from '{}'", self.url)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::RangeServer;

	#[test]
	fn rejects_other_schemes() {
		let url = Url::parse("ftp://example.org/map.pmtiles").unwrap();
		assert!(HttpBackend::new(Client::new(), url, 0).is_err());
	}

	#[test]
	fn content_range_validation() {
		let range = ByteRange::new(10, 5);
		assert!(check_content_range("bytes 10-14/100", range).is_ok());
		assert!(check_content_range("bytes 10-14/*", range).is_ok());
		assert!(check_content_range("bytes 11-14/100", range).is_err());
		assert!(check_content_range("bytes 10-20/100", range).is_err());
		assert!(check_content_range("10-14", range).is_err());
	}

	#[tokio::test]
	async fn reads_ranges_from_server() -> Result<()> {
		let server = RangeServer::start(&[("/data.bin", Blob::from("0123456789abcdef"))]).await;
		let backend = HttpBackend::new(Client::new(), server.url("/data.bin"), 0)?;

		assert_eq!(backend.read(10, 6).await?.as_str(), "abcdef");
		assert_eq!(backend.read(0, 3).await?.as_str(), "012");
		assert_eq!(backend.read(5, 0).await?.len(), 0);
		assert_eq!(server.request_count(), 2);
		Ok(())
	}

	#[tokio::test]
	async fn missing_file_and_unsatisfiable_range_read_empty() -> Result<()> {
		let server = RangeServer::start(&[("/data.bin", Blob::from("0123"))]).await;

		let missing = HttpBackend::new(Client::new(), server.url("/missing.bin"), 0)?;
		assert!(missing.read(0, 2).await?.is_empty());

		let short = HttpBackend::new(Client::new(), server.url("/data.bin"), 0)?;
		assert!(short.read(100, 2).await?.is_empty());
		Ok(())
	}

	#[tokio::test]
	async fn truncated_range_is_an_error() -> Result<()> {
		let server = RangeServer::start(&[("/data.bin", Blob::from("0123"))]).await;
		let backend = HttpBackend::new(Client::new(), server.url("/data.bin"), 0)?;
		// server clamps the range to the file end
		let err = backend.read(0, 10).await.unwrap_err();
		assert!(format!("{err:#}").contains("Content-Range end mismatch"), "{err:#}");
		Ok(())
	}
}
