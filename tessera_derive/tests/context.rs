use anyhow::{Result, bail};
use futures::executor::block_on;
use tessera_derive::context;

#[context("parsing level '{input}'")]
fn parse_level(input: &str) -> Result<u8> {
	Ok(input.parse::<u8>()?)
}

#[context("loading archive {name}")]
async fn load(name: &str) -> Result<()> {
	bail!("{name} is missing")
}

#[test]
fn sync_error_gets_context() {
	assert_eq!(parse_level("7").unwrap(), 7);
	let err = parse_level("x").unwrap_err();
	assert_eq!(err.to_string(), "parsing level 'x'");
	assert_eq!(err.chain().count(), 2);
}

#[test]
fn async_error_gets_context() {
	let err = block_on(load("map.pmtiles")).unwrap_err();
	assert_eq!(format!("{err:#}"), "loading archive map.pmtiles: map.pmtiles is missing");
}
