use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use std::io;

use ptk_core::{
	scale5to8,
	scale8to5,
	texture::Color
};

/// GS pixel storage modes, as encoded in the PSM fields of the BITBLTBUF
/// and TEX0 registers. The Z variants address a different GS memory bank
/// but share the wire layout of their CT counterparts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PixelFormat {
	PSMCT32 = 0x00,
	PSMCT24 = 0x01,
	PSMCT16 = 0x02,
	PSMCT16S = 0x0A,
	PSMT8 = 0x13,
	PSMT4 = 0x14,
	PSMT8H = 0x1B,
	PSMT4HL = 0x24,
	PSMT4HH = 0x2C,
	PSMZ32 = 0x30,
	PSMZ24 = 0x31,
	PSMZ16 = 0x32,
	PSMZ16S = 0x3A,
}

impl PixelFormat {
	pub fn from_u8(value: u8) -> Option<PixelFormat> {
		match value {
			0x00 => Some(PixelFormat::PSMCT32),
			0x01 => Some(PixelFormat::PSMCT24),
			0x02 => Some(PixelFormat::PSMCT16),
			0x0A => Some(PixelFormat::PSMCT16S),
			0x13 => Some(PixelFormat::PSMT8),
			0x14 => Some(PixelFormat::PSMT4),
			0x1B => Some(PixelFormat::PSMT8H),
			0x24 => Some(PixelFormat::PSMT4HL),
			0x2C => Some(PixelFormat::PSMT4HH),
			0x30 => Some(PixelFormat::PSMZ32),
			0x31 => Some(PixelFormat::PSMZ24),
			0x32 => Some(PixelFormat::PSMZ16),
			0x3A => Some(PixelFormat::PSMZ16S),
			_ => None,
		}
	}

	/// Bits per element on the wire
	pub const fn bits_per_pixel(self) -> usize {
		match self {
			PixelFormat::PSMCT32 | PixelFormat::PSMZ32 => 32,
			PixelFormat::PSMCT24 | PixelFormat::PSMZ24 => 24,
			PixelFormat::PSMCT16 | PixelFormat::PSMCT16S |
				PixelFormat::PSMZ16 | PixelFormat::PSMZ16S => 16,
			PixelFormat::PSMT8 | PixelFormat::PSMT8H => 8,
			PixelFormat::PSMT4 | PixelFormat::PSMT4HL | PixelFormat::PSMT4HH => 4,
		}
	}

	pub const fn is_indexed(self) -> bool {
		matches!(
			self,
			PixelFormat::PSMT8 | PixelFormat::PSMT8H |
				PixelFormat::PSMT4 | PixelFormat::PSMT4HL | PixelFormat::PSMT4HH
		)
	}

	/// Number of palette entries an indexed format addresses; zero for
	/// direct color formats
	pub const fn palette_size(self) -> usize {
		match self.bits_per_pixel() {
			8 => 256,
			4 => 16,
			_ => 0,
		}
	}
}

/// Scales an 8 bit alpha to the GS convention where 0x80 is fully opaque
pub const fn alpha_to_gs(a: u8) -> u8 {
	((a as u32 * 128 + 127) / 255) as u8
}

/// Scales a GS alpha back to the 8 bit convention
pub const fn alpha_from_gs(a: u8) -> u8 {
	let v = (a as u32 * 255 + 64) / 128;
	if v > 255 {
		255
	} else {
		v as u8
	}
}

/// Per-index address table for one 32-byte PSMT8 tile, from the GS column
/// layout (a 16x4 column holds two tiles). Applying it twice is the
/// identity, so decode and encode share it.
const PSMT8_TILE: [usize; 32] = [
	0, 1, 2, 3, 4, 5, 6, 7,
	16, 17, 18, 19, 20, 21, 22, 23,
	8, 9, 10, 11, 12, 13, 14, 15,
	24, 25, 26, 27, 28, 29, 30, 31,
];

/// Remaps PSMT8 indices between file order and raster order, one complete
/// 32-byte tile at a time. A trailing partial tile stays in place.
pub fn swizzle_psmt8(indices: &mut [u8]) {
	let mut src = [0; 32];

	for tile in indices.chunks_exact_mut(32) {
		src.copy_from_slice(tile);
		for (i, v) in tile.iter_mut().enumerate() {
			*v = src[PSMT8_TILE[i]];
		}
	}
}

#[cfg(feature = "import")]
pub fn read_psmct32<R>(buf: &mut R, width: usize, height: usize) -> io::Result<Vec<Color>>
where
	R: ReadBytesExt,
{
	let mut colors = Vec::with_capacity(width * height);

	for _ in 0..(width * height) {
		let red = buf.read_u8()?;
		let green = buf.read_u8()?;
		let blue = buf.read_u8()?;
		let alpha = alpha_from_gs(buf.read_u8()?);
		colors.push(Color::new(red, green, blue, alpha));
	}

	Ok(colors)
}

#[cfg(feature = "export")]
pub fn write_psmct32<W>(buf: &mut W, colors: &[Color]) -> io::Result<()>
where
	W: WriteBytesExt,
{
	for color in colors {
		buf.write_u8(color.red)?;
		buf.write_u8(color.green)?;
		buf.write_u8(color.blue)?;
		buf.write_u8(alpha_to_gs(color.alpha))?;
	}

	Ok(())
}

#[cfg(feature = "import")]
pub fn read_psmct24<R>(buf: &mut R, width: usize, height: usize) -> io::Result<Vec<Color>>
where
	R: ReadBytesExt,
{
	let mut colors = Vec::with_capacity(width * height);

	for _ in 0..(width * height) {
		let red = buf.read_u8()?;
		let green = buf.read_u8()?;
		let blue = buf.read_u8()?;
		colors.push(Color::opaque(red, green, blue));
	}

	Ok(colors)
}

#[cfg(feature = "export")]
pub fn write_psmct24<W>(buf: &mut W, colors: &[Color]) -> io::Result<()>
where
	W: WriteBytesExt,
{
	for color in colors {
		buf.write_u8(color.red)?;
		buf.write_u8(color.green)?;
		buf.write_u8(color.blue)?;
	}

	Ok(())
}

#[cfg(feature = "import")]
pub fn read_psmct16<R>(buf: &mut R, width: usize, height: usize) -> io::Result<Vec<Color>>
where
	R: ReadBytesExt,
{
	let mut colors = Vec::with_capacity(width * height);

	for _ in 0..(width * height) {
		let v = buf.read_u16::<LE>()?;
		colors.push(Color::new(
			scale5to8((v & 31) as u8),
			scale5to8(((v >> 5) & 31) as u8),
			scale5to8(((v >> 10) & 31) as u8),
			if v & 0x8000 != 0 { 0xFF } else { 0 },
		));
	}

	Ok(colors)
}

#[cfg(feature = "export")]
pub fn write_psmct16<W>(buf: &mut W, colors: &[Color]) -> io::Result<()>
where
	W: WriteBytesExt,
{
	for color in colors {
		let v = scale8to5(color.red) as u16
			| (scale8to5(color.green) as u16) << 5
			| (scale8to5(color.blue) as u16) << 10
			| if color.alpha >= 0x80 { 0x8000 } else { 0 };
		buf.write_u16::<LE>(v)?;
	}

	Ok(())
}

#[cfg(feature = "import")]
pub fn read_psmt8<R>(buf: &mut R, width: usize, height: usize) -> io::Result<Vec<u8>>
where
	R: ReadBytesExt,
{
	let mut indices = vec![0; width * height];
	buf.read_exact(&mut indices)?;
	swizzle_psmt8(&mut indices);

	Ok(indices)
}

#[cfg(feature = "export")]
pub fn write_psmt8<W>(buf: &mut W, indices: &[u8]) -> io::Result<()>
where
	W: WriteBytesExt,
{
	let mut swizzled = indices.to_vec();
	swizzle_psmt8(&mut swizzled);

	buf.write_all(&swizzled)
}

#[cfg(feature = "import")]
pub fn read_psmt4<R>(buf: &mut R, width: usize, height: usize) -> io::Result<Vec<u8>>
where
	R: ReadBytesExt,
{
	let count = width * height;
	let mut indices = Vec::with_capacity(count);

	for _ in 0..(count + 1) / 2 {
		let b = buf.read_u8()?;
		indices.push(b & 0xF);
		if indices.len() < count {
			indices.push(b >> 4);
		}
	}

	Ok(indices)
}

#[cfg(feature = "export")]
pub fn write_psmt4<W>(buf: &mut W, indices: &[u8]) -> io::Result<()>
where
	W: WriteBytesExt,
{
	for pair in indices.chunks(2) {
		let lo = pair[0] & 0xF;
		let hi = if pair.len() > 1 { pair[1] & 0xF } else { 0 };
		buf.write_u8(lo | hi << 4)?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_alpha_scaling() {
		assert_eq!(alpha_to_gs(0), 0);
		assert_eq!(alpha_to_gs(128), 64);
		assert_eq!(alpha_to_gs(255), 128);
		assert_eq!(alpha_from_gs(0), 0);
		assert_eq!(alpha_from_gs(64), 128);
		assert_eq!(alpha_from_gs(128), 255);
		assert_eq!(alpha_from_gs(255), 255);
	}

	#[test]
	fn test_psmct32_roundtrip() {
		let colors = vec![
			Color::new(255, 0, 0, 0),
			Color::new(0, 255, 0, 2),
			Color::new(0, 0, 255, 128),
			Color::opaque(255, 255, 255),
		];

		let mut wire = vec![];
		write_psmct32(&mut wire, &colors).unwrap();
		assert_eq!(&wire[..4], &[0xFF, 0, 0, 0]);
		assert_eq!(&wire[12..], &[0xFF, 0xFF, 0xFF, 0x80]);

		assert_eq!(read_psmct32(&mut &wire[..], 2, 2).unwrap(), colors);
	}

	#[test]
	fn test_psmct24_opaque() {
		let mut wire = vec![];
		write_psmct24(&mut wire, &[Color::new(1, 2, 3, 77)]).unwrap();
		assert_eq!(wire, [1, 2, 3]);

		assert_eq!(
			read_psmct24(&mut &wire[..], 1, 1).unwrap(),
			vec![Color::opaque(1, 2, 3)]
		);
	}

	#[test]
	fn test_psmct16_roundtrip() {
		let colors = vec![Color::opaque(248, 0, 0)];

		let mut wire = vec![];
		write_psmct16(&mut wire, &colors).unwrap();
		assert_eq!(wire, [0x1F, 0x80]);

		assert_eq!(read_psmct16(&mut &wire[..], 1, 1).unwrap(), colors);
	}

	#[test]
	fn test_psmct16_idempotent_after_one_round() {
		let first = {
			let mut wire = vec![];
			write_psmct16(&mut wire, &[Color::new(100, 200, 50, 129)]).unwrap();
			read_psmct16(&mut &wire[..], 1, 1).unwrap()
		};

		let mut wire = vec![];
		write_psmct16(&mut wire, &first).unwrap();
		assert_eq!(read_psmct16(&mut &wire[..], 1, 1).unwrap(), first);
	}

	#[test]
	fn test_psmt4_packing() {
		let indices: Vec<u8> = (0..16).collect();

		let mut wire = vec![];
		write_psmt4(&mut wire, &indices).unwrap();
		assert_eq!(wire, [0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE]);

		assert_eq!(read_psmt4(&mut &wire[..], 4, 4).unwrap(), indices);
	}

	#[test]
	fn test_psmt4_single_nibble() {
		let mut wire = vec![];
		write_psmt4(&mut wire, &[7]).unwrap();
		assert_eq!(wire, [0x07]);

		assert_eq!(read_psmt4(&mut &wire[..], 1, 1).unwrap(), vec![7]);
	}

	#[test]
	fn test_psmt8_swizzle_involution() {
		let mut indices: Vec<u8> = (0..=255).collect();
		swizzle_psmt8(&mut indices);
		assert_ne!(indices[8], 8);
		assert_eq!(indices[8], 16);

		swizzle_psmt8(&mut indices);
		assert_eq!(indices, (0..=255).collect::<Vec<u8>>());
	}

	#[test]
	fn test_psmt8_roundtrip() {
		let indices: Vec<u8> = (0..64).map(|i| 255 - i).collect();

		let mut wire = vec![];
		write_psmt8(&mut wire, &indices).unwrap();
		assert_eq!(read_psmt8(&mut &wire[..], 16, 4).unwrap(), indices);
	}

	#[test]
	fn test_format_properties() {
		assert!(PixelFormat::PSMT4HH.is_indexed());
		assert!(!PixelFormat::PSMZ16S.is_indexed());
		assert_eq!(PixelFormat::PSMT8H.palette_size(), 256);
		assert_eq!(PixelFormat::PSMT4HL.palette_size(), 16);
		assert_eq!(PixelFormat::PSMCT24.palette_size(), 0);
		assert_eq!(PixelFormat::PSMZ24.bits_per_pixel(), 24);
		assert_eq!(PixelFormat::from_u8(0x3A), Some(PixelFormat::PSMZ16S));
		assert_eq!(PixelFormat::from_u8(0x15), None);
	}
}
