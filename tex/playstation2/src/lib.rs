pub mod clut;
pub mod gs;
pub mod tmx;

#[cfg(any(feature = "import", feature = "export"))]
use std::fs;

#[cfg(feature = "import")]
use std::io::Cursor;

#[cfg(any(feature = "import", feature = "export"))]
use ptk_core::texture::Bitmap;

#[cfg(feature = "export")]
use ptk_core::texture::Raster;

#[cfg(any(feature = "import", feature = "export"))]
use gs::PixelFormat;
#[cfg(any(feature = "import", feature = "export"))]
use tmx::*;

/// Reads a TMX file, decoding the base level through palette 0
#[cfg(feature = "import")]
pub fn read_tmx(filepath: &str) -> Result<Bitmap, TMXImportError> {
	let input = fs::read(filepath)?;
	let tex = TMXFile::read(&mut Cursor::new(input))?;

	Ok(tex.to_raster(0, None))
}

/// Encodes a raster into a TMX file in the given pixel format
#[cfg(feature = "export")]
pub fn write_tmx<T>(filepath: &str, raster: &T, format: PixelFormat) -> Result<(), TMXExportError>
where
	T: Raster + ?Sized,
{
	let tex = TMXFile::from_raster(raster, format, None)?;
	let mut output = fs::File::create(filepath)?;

	tex.write(&mut output)
}

#[cfg(all(feature = "import", feature = "export"))]
#[test]
fn test_file_roundtrip() {
	let tmp = std::env::temp_dir().join("ptk_tmx_test.tmx");
	let path = tmp.to_str().unwrap();

	let bmp = Bitmap::from_pixels(2, 2, vec![
		ptk_core::texture::Color::opaque(255, 0, 0),
		ptk_core::texture::Color::opaque(0, 255, 0),
		ptk_core::texture::Color::opaque(0, 0, 255),
		ptk_core::texture::Color::opaque(255, 255, 255),
	]);
	write_tmx(path, &bmp, PixelFormat::PSMCT32).unwrap();

	let back = read_tmx(path).unwrap();
	assert_eq!(back.pixels, bmp.pixels);

	fs::remove_file(path).unwrap();
}
