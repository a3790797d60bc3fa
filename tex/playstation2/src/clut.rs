use std::io;

use byteorder::{
	ReadBytesExt,
	WriteBytesExt
};

use ptk_core::texture::Color;

use crate::gs::{
	self,
	PixelFormat
};

/// CSM1 storage permutation: a 256 entry CLUT lives in GS memory as a
/// 16x16 image whose 2x2 tiling lands the middle 8-entry runs of every
/// 32-entry block in swapped positions. Applying it twice is the
/// identity, so the same routine serves both directions. Palettes
/// shorter than a full block (16 entries) are stored untiled.
pub fn tile(palette: &mut [Color]) {
	for block in palette.chunks_exact_mut(32) {
		for i in 8..16 {
			block.swap(i, i + 8);
		}
	}
}

/// Reads one CLUT stored as a 16x16 (256 color) or 4x4 (16 color)
/// image in the given palette format
#[cfg(feature = "import")]
pub fn read_palette<R>(
	buf: &mut R,
	format: PixelFormat,
	num_colors: usize,
) -> io::Result<Vec<Color>>
where
	R: ReadBytesExt,
{
	let side = if num_colors == 256 { 16 } else { 4 };

	let mut palette = match format {
		PixelFormat::PSMCT24 => gs::read_psmct24(buf, side, side)?,
		PixelFormat::PSMCT16 | PixelFormat::PSMCT16S => gs::read_psmct16(buf, side, side)?,
		_ => gs::read_psmct32(buf, side, side)?,
	};

	if palette.len() == 256 {
		tile(&mut palette);
	}

	Ok(palette)
}

/// Writes one CLUT; the inverse of [`read_palette`]
#[cfg(feature = "export")]
pub fn write_palette<W>(
	buf: &mut W,
	format: PixelFormat,
	palette: &[Color],
) -> io::Result<()>
where
	W: WriteBytesExt,
{
	let mut colors = palette.to_vec();
	if colors.len() == 256 {
		tile(&mut colors);
	}

	match format {
		PixelFormat::PSMCT24 => gs::write_psmct24(buf, &colors),
		PixelFormat::PSMCT16 | PixelFormat::PSMCT16S => gs::write_psmct16(buf, &colors),
		_ => gs::write_psmct32(buf, &colors),
	}
}
