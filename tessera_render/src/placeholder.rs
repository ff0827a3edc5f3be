//! Fixed, minimal, transparent images substituted for raster resources that could not be fetched.

/// 1×1 transparent PNG.
pub const TRANSPARENT_PNG: &[u8] = &[
	0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, //
	0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, //
	0x08, 0x04, 0x00, 0x00, 0x00, 0xb5, 0x1c, 0x0c, 0x02, 0x00, 0x00, 0x00, //
	0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64, 0x60, 0x00, 0x00, //
	0x00, 0x06, 0x00, 0x02, 0x30, 0x81, 0xd0, 0x2f, 0x00, 0x00, 0x00, 0x00, //
	0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// 1×1 transparent lossless WebP.
pub const TRANSPARENT_WEBP: &[u8] = &[
	0x52, 0x49, 0x46, 0x46, 0x26, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50, //
	0x56, 0x50, 0x38, 0x4c, 0x0d, 0x00, 0x00, 0x00, 0x2f, 0x00, 0x00, 0x00, //
	0x10, 0x07, 0x10, 0x11, 0x11, 0x88, 0x88, 0xfe, 0x07, 0x00,
];

/// 1×1 white greyscale JPEG. JPEG has no alpha channel, white is the least visible fill.
pub const BLANK_JPEG: &[u8] = &[
	0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46, 0x00, 0x01, //
	0x01, 0x01, 0x00, 0x48, 0x00, 0x48, 0x00, 0x00, 0xff, 0xdb, 0x00, 0x43, //
	0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
	0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
	0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
	0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
	0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
	0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc2, 0x00, 0x0b, 0x08, 0x00, 0x01, //
	0x00, 0x01, 0x01, 0x01, 0x11, 0x00, 0xff, 0xc4, 0x00, 0x14, 0x10, 0x01, //
	0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
	0x00, 0x00, 0x00, 0x00, 0xff, 0xda, 0x00, 0x08, 0x01, 0x01, 0x00, 0x01, //
	0x3f, 0x10, 0xff, 0xd9,
];

/// The placeholder for a lowercase file extension, if it names a raster image type.
pub fn for_extension(extension: &str) -> Option<&'static [u8]> {
	match extension {
		"png" => Some(TRANSPARENT_PNG),
		"webp" => Some(TRANSPARENT_WEBP),
		"jpg" | "jpeg" => Some(BLANK_JPEG),
		_ => None,
	}
}

/// Lowercase extension of the last path segment of `url`, ignoring query and fragment.
pub fn extension(url: &str) -> Option<String> {
	let path = url.split(['?', '#']).next().unwrap_or_default();
	let name = path.rsplit('/').next().unwrap_or_default();
	let (stem, ext) = name.rsplit_once('.')?;
	if stem.is_empty() || ext.is_empty() {
		return None;
	}
	Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("https://example.org/sprite.png", Some("png"))]
	#[case("https://example.org/sprite@2x.PNG?token=a/b", Some("png"))]
	#[case("pmtiles:///data/map.pmtiles/3/2/1", None)]
	#[case("https://example.org/tiles/3/2/1.pbf#frag", Some("pbf"))]
	#[case("/srv/fonts/Noto Sans/0-255.pbf", Some("pbf"))]
	#[case("https://example.org/photo.JPEG", Some("jpeg"))]
	#[case("https://example.org/.hidden", None)]
	#[case("https://example.org/style", None)]
	fn extracts_extension(#[case] url: &str, #[case] expected: Option<&str>) {
		assert_eq!(extension(url).as_deref(), expected);
	}

	#[test]
	fn placeholders_have_valid_signatures() {
		assert_eq!(&TRANSPARENT_PNG[..8], b"\x89PNG\r\n\x1a\n");
		assert_eq!(&TRANSPARENT_WEBP[..4], b"RIFF");
		assert_eq!(&TRANSPARENT_WEBP[8..12], b"WEBP");
		assert_eq!(&BLANK_JPEG[..2], &[0xff, 0xd8]);
		assert_eq!(&BLANK_JPEG[BLANK_JPEG.len() - 2..], &[0xff, 0xd9]);
	}

	#[rstest]
	#[case("png", Some(TRANSPARENT_PNG))]
	#[case("webp", Some(TRANSPARENT_WEBP))]
	#[case("jpg", Some(BLANK_JPEG))]
	#[case("jpeg", Some(BLANK_JPEG))]
	#[case("pbf", None)]
	#[case("json", None)]
	fn maps_extensions(#[case] ext: &str, #[case] expected: Option<&'static [u8]>) {
		assert_eq!(for_extension(ext), expected);
	}
}
