use byteorder::{
	BE,
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use std::io;

#[cfg(any(feature = "import", feature = "export"))]
use std::io::Seek;

#[cfg(feature = "export")]
use std::io::SeekFrom;

use thiserror::Error;

use ptk_core::{
	tag4,
	texture::{
		Bitmap,
		Color,
		Raster
	}
};

#[cfg(feature = "import")]
use ptk_core::io_ext::{
	ReadBinExt,
	SeekBinExt
};

#[cfg(feature = "export")]
use ptk_core::io_ext::WriteBinExt;

#[cfg(feature = "export")]
use ptk_quant::{
	nearest_index,
	quantize,
	QuantizerError,
	QuantizerOptions
};

use crate::{
	clut,
	gs::{
		self,
		PixelFormat
	}
};

pub const MAGIC: u32 = tag4!(b"TMX0");
pub const FLAG: i16 = 0x0002;

const COMMENT_LENGTH: usize = 28;
const MIPKL_UNSET: u16 = 0xFFFF;
const WRAP_UNSET: u8 = 0xFF;

#[cfg(feature = "import")]
#[derive(Debug, Error)]
pub enum TMXImportError {
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Not a TMX file: {0:08X}")]
	Magic(u32),
	#[error("Unknown pixel format: {0:#04X}")]
	PixelFormat(u8),
	#[error("Invalid palette format: {0:#04X}")]
	PaletteFormat(u8),
	#[error("Pixel format {format:?} cannot carry {count} palettes")]
	PaletteCount {
		format: PixelFormat,
		count: u8,
	},
}

#[cfg(feature = "export")]
#[derive(Debug, Error)]
pub enum TMXExportError {
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Mip level {level} has degenerate dimensions {width}x{height}")]
	MipSize {
		level: usize,
		width: usize,
		height: usize,
	},
	#[error("Unsupported mip chain length: {0}")]
	MipCount(usize),
	#[error("Level {level} holds {actual} elements, expected {expected}")]
	DataSize {
		level: usize,
		expected: usize,
		actual: usize,
	},
	#[error("Palette {index} holds {actual} colors, expected {expected}")]
	PaletteSize {
		index: usize,
		expected: usize,
		actual: usize,
	},
	#[error("Pixel format {format:?} cannot carry {count} palettes")]
	PaletteCount {
		format: PixelFormat,
		count: usize,
	},
	#[error("Palette format {0:?} cannot store colors")]
	PaletteFormat(PixelFormat),
	#[error("Index {index} exceeds the {format:?} palette")]
	IndexRange {
		format: PixelFormat,
		index: u8,
	},
	#[error("Quantizer error")]
	Quantizer {
		#[from]
		source: QuantizerError,
	},
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WrapMode {
	Repeat = 0,
	Clamp = 1,
}

impl WrapMode {
	fn from_bits(v: u8) -> WrapMode {
		match v & 3 {
			1 => WrapMode::Clamp,
			_ => WrapMode::Repeat,
		}
	}
}

/// Dimensions of a stored level; level 0 is the base image and level `k`
/// the k'th mip at the TMX divisor of 4k
pub fn level_dimensions(width: u16, height: u16, level: usize) -> (usize, usize) {
	if level == 0 {
		(width as usize, height as usize)
	} else {
		(width as usize / (4 * level), height as usize / (4 * level))
	}
}

/// Pixel payload: the base level followed by any mip levels. Indexed
/// formats keep one index per byte here; nibble packing happens on the
/// wire only.
#[derive(Clone, Debug, PartialEq)]
pub enum TMXData {
	Direct(Vec<Vec<Color>>),
	Indexed(Vec<Vec<u8>>),
}

impl TMXData {
	pub fn num_levels(&self) -> usize {
		match self {
			TMXData::Direct(levels) => levels.len(),
			TMXData::Indexed(levels) => levels.len(),
		}
	}

	#[cfg(feature = "export")]
	fn level_len(&self, level: usize) -> usize {
		match self {
			TMXData::Direct(levels) => levels[level].len(),
			TMXData::Indexed(levels) => levels[level].len(),
		}
	}

	#[cfg(feature = "import")]
	fn read<R>(
		buf: &mut R,
		format: PixelFormat,
		width: u16,
		height: u16,
		num_levels: usize,
	) -> io::Result<TMXData>
	where
		R: ReadBytesExt,
	{
		if format.is_indexed() {
			let mut levels = Vec::with_capacity(num_levels);

			for level in 0..num_levels {
				let (w, h) = level_dimensions(width, height, level);
				levels.push(if format.bits_per_pixel() == 4 {
					gs::read_psmt4(buf, w, h)?
				} else {
					gs::read_psmt8(buf, w, h)?
				});
			}

			Ok(TMXData::Indexed(levels))
		} else {
			let mut levels = Vec::with_capacity(num_levels);

			for level in 0..num_levels {
				let (w, h) = level_dimensions(width, height, level);
				levels.push(match format.bits_per_pixel() {
					24 => gs::read_psmct24(buf, w, h)?,
					16 => gs::read_psmct16(buf, w, h)?,
					_ => gs::read_psmct32(buf, w, h)?,
				});
			}

			Ok(TMXData::Direct(levels))
		}
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W, format: PixelFormat) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		match self {
			TMXData::Direct(levels) => {
				for level in levels {
					match format.bits_per_pixel() {
						24 => gs::write_psmct24(buf, level)?,
						16 => gs::write_psmct16(buf, level)?,
						_ => gs::write_psmct32(buf, level)?,
					}
				}
			},
			TMXData::Indexed(levels) => {
				for level in levels {
					if format.bits_per_pixel() == 4 {
						gs::write_psmt4(buf, level)?;
					} else {
						gs::write_psmt8(buf, level)?;
					}
				}
			},
		}

		Ok(())
	}
}

fn truncate_comment(comment: &str) -> String {
	let mut end = comment.len().min(COMMENT_LENGTH - 1);
	while !comment.is_char_boundary(end) {
		end -= 1;
	}

	comment[..end].to_string()
}

#[derive(Clone, Debug, PartialEq)]
pub struct TMXFile {
	flag: i16,
	user_id: i16,
	pub user_texture_id: i32,
	pub user_clut_id: i32,
	width: u16,
	height: u16,
	pixel_format: PixelFormat,
	palette_format: u8,
	mip_kl: u16,
	reserved: u8,
	wrap_modes: u8,
	user_comment: String,
	palettes: Vec<Vec<Color>>,
	data: TMXData,
}

impl TMXFile {
	/// Builds a direct color TMX from caller-supplied levels
	#[cfg(feature = "export")]
	pub fn direct(
		width: u16,
		height: u16,
		pixel_format: PixelFormat,
		levels: Vec<Vec<Color>>,
		comment: Option<&str>,
	) -> Result<TMXFile, TMXExportError> {
		if pixel_format.is_indexed() {
			return Err(TMXExportError::PaletteCount {
				format: pixel_format,
				count: 0,
			});
		}

		let tmx = TMXFile {
			flag: FLAG,
			user_id: 0,
			user_texture_id: 0,
			user_clut_id: 0,
			width: width,
			height: height,
			pixel_format: pixel_format,
			palette_format: 0,
			mip_kl: MIPKL_UNSET,
			reserved: 0,
			wrap_modes: WRAP_UNSET,
			user_comment: truncate_comment(comment.unwrap_or("")),
			palettes: vec![],
			data: TMXData::Direct(levels),
		};
		tmx.validate()?;

		Ok(tmx)
	}

	/// Builds an indexed TMX from caller-supplied palettes and levels
	#[cfg(feature = "export")]
	pub fn indexed(
		width: u16,
		height: u16,
		pixel_format: PixelFormat,
		palette_format: PixelFormat,
		palettes: Vec<Vec<Color>>,
		levels: Vec<Vec<u8>>,
		comment: Option<&str>,
	) -> Result<TMXFile, TMXExportError> {
		if !pixel_format.is_indexed() {
			return Err(TMXExportError::PaletteCount {
				format: pixel_format,
				count: palettes.len(),
			});
		}
		if !matches!(
			palette_format,
			PixelFormat::PSMCT32 | PixelFormat::PSMCT24 |
				PixelFormat::PSMCT16 | PixelFormat::PSMCT16S
		) {
			return Err(TMXExportError::PaletteFormat(palette_format));
		}

		let tmx = TMXFile {
			flag: FLAG,
			user_id: 0,
			user_texture_id: 0,
			user_clut_id: 0,
			width: width,
			height: height,
			pixel_format: pixel_format,
			palette_format: palette_format as u8,
			mip_kl: MIPKL_UNSET,
			reserved: 0,
			wrap_modes: WRAP_UNSET,
			user_comment: truncate_comment(comment.unwrap_or("")),
			palettes: palettes,
			data: TMXData::Indexed(levels),
		};
		tmx.validate()?;

		Ok(tmx)
	}

	/// Encodes a host raster as a base-level-only TMX. Indexed target
	/// formats reuse the raster's embedded palette when it has one and
	/// quantize otherwise.
	#[cfg(feature = "export")]
	pub fn from_raster<T>(
		raster: &T,
		pixel_format: PixelFormat,
		comment: Option<&str>,
	) -> Result<TMXFile, TMXExportError>
	where
		T: Raster + ?Sized,
	{
		let width = raster.width() as u16;
		let height = raster.height() as u16;
		let pixels = raster.pixels();

		if !pixel_format.is_indexed() {
			return TMXFile::direct(width, height, pixel_format, vec![pixels], comment);
		}

		let size = pixel_format.palette_size();
		let (mut palette, indices) = match raster.palette(size) {
			Some(palette) => {
				let indices = pixels
					.iter()
					.map(|px| nearest_index(&palette, *px) as u8)
					.collect();
				(palette, indices)
			},
			None => {
				let quantized = quantize(&pixels, &QuantizerOptions {
					max_colors: size,
					..Default::default()
				})?;
				(quantized.palette, quantized.indices)
			},
		};
		palette.resize(size, Color::default());

		TMXFile::indexed(
			width,
			height,
			pixel_format,
			PixelFormat::PSMCT32,
			vec![palette],
			vec![indices],
			comment,
		)
	}

	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<TMXFile, TMXImportError>
	where
		R: ReadBytesExt + Seek,
	{
		let base = buf.stream_position()?;

		let flag = buf.read_i16::<LE>()?;
		let user_id = buf.read_i16::<LE>()?;
		let _total_length = buf.read_i32::<LE>()?;

		let magic = buf.read_u32::<BE>()?;
		if magic != MAGIC {
			return Err(TMXImportError::Magic(magic));
		}
		buf.align_to(base, 16)?;

		let palette_count = buf.read_u8()?;
		let palette_format = buf.read_u8()?;
		let width = buf.read_u16::<LE>()?;
		let height = buf.read_u16::<LE>()?;

		let format_byte = buf.read_u8()?;
		let pixel_format = match PixelFormat::from_u8(format_byte) {
			Some(format) => format,
			None => return Err(TMXImportError::PixelFormat(format_byte)),
		};

		let mip_count = buf.read_u8()?;
		let mip_kl = buf.read_u16::<LE>()?;
		let reserved = buf.read_u8()?;
		let wrap_modes = buf.read_u8()?;
		let user_texture_id = buf.read_i32::<LE>()?;
		let user_clut_id = buf.read_i32::<LE>()?;
		let user_comment = buf.read_fixed_cstr(COMMENT_LENGTH)?;

		if pixel_format.is_indexed() == (palette_count == 0) {
			return Err(TMXImportError::PaletteCount {
				format: pixel_format,
				count: palette_count,
			});
		}

		let mut palettes = Vec::with_capacity(palette_count as usize);
		if pixel_format.is_indexed() {
			let clut_format = match PixelFormat::from_u8(palette_format) {
				Some(format) if matches!(
					format,
					PixelFormat::PSMCT32 | PixelFormat::PSMCT24 |
						PixelFormat::PSMCT16 | PixelFormat::PSMCT16S
				) => format,
				_ => return Err(TMXImportError::PaletteFormat(palette_format)),
			};

			for _ in 0..palette_count {
				palettes.push(clut::read_palette(
					buf,
					clut_format,
					pixel_format.palette_size(),
				)?);
			}
		}

		let data = TMXData::read(buf, pixel_format, width, height, (mip_count as usize) + 1)?;

		Ok(TMXFile {
			flag: flag,
			user_id: user_id,
			user_texture_id: user_texture_id,
			user_clut_id: user_clut_id,
			width: width,
			height: height,
			pixel_format: pixel_format,
			palette_format: palette_format,
			mip_kl: mip_kl,
			reserved: reserved,
			wrap_modes: wrap_modes,
			user_comment: user_comment,
			palettes: palettes,
			data: data,
		})
	}

	/// Serializes the TMX, leaving the writer positioned just after it.
	/// The total length field is back-patched once the body size is known,
	/// so the writer must be seekable.
	#[cfg(feature = "export")]
	pub fn write<W>(&self, buf: &mut W) -> Result<(), TMXExportError>
	where
		W: WriteBytesExt + Seek,
	{
		self.validate()?;

		let base = buf.stream_position()?;
		buf.seek(SeekFrom::Current(16))?;

		buf.write_u8(self.palettes.len() as u8)?;
		buf.write_u8(self.palette_format)?;
		buf.write_u16::<LE>(self.width)?;
		buf.write_u16::<LE>(self.height)?;
		buf.write_u8(self.pixel_format as u8)?;
		buf.write_u8((self.data.num_levels() - 1) as u8)?;
		buf.write_u16::<LE>(self.mip_kl)?;
		buf.write_u8(self.reserved)?;
		buf.write_u8(self.wrap_modes)?;
		buf.write_i32::<LE>(self.user_texture_id)?;
		buf.write_i32::<LE>(self.user_clut_id)?;
		buf.write_fixed_cstr(&self.user_comment, COMMENT_LENGTH)?;

		if let Some(format) = self.palette_format() {
			for palette in &self.palettes {
				clut::write_palette(buf, format, palette)?;
			}
		}

		self.data.write(buf, self.pixel_format)?;

		let end = buf.stream_position()?;
		buf.seek(SeekFrom::Start(base))?;
		buf.write_i16::<LE>(self.flag)?;
		buf.write_i16::<LE>(self.user_id)?;
		buf.write_i32::<LE>((end - base) as i32)?;
		buf.write_u32::<BE>(MAGIC)?;
		buf.write_all(&[0; 4])?;
		buf.seek(SeekFrom::Start(end))?;

		Ok(())
	}

	#[cfg(feature = "export")]
	fn validate(&self) -> Result<(), TMXExportError> {
		let num_levels = self.data.num_levels();
		if num_levels == 0 || num_levels > 256 {
			return Err(TMXExportError::MipCount(num_levels));
		}

		// the palette count is a single header byte
		let palette_size = self.pixel_format.palette_size();
		if self.pixel_format.is_indexed() == self.palettes.is_empty() || self.palettes.len() > 255 {
			return Err(TMXExportError::PaletteCount {
				format: self.pixel_format,
				count: self.palettes.len(),
			});
		}

		for (i, palette) in self.palettes.iter().enumerate() {
			if palette.len() != palette_size {
				return Err(TMXExportError::PaletteSize {
					index: i,
					expected: palette_size,
					actual: palette.len(),
				});
			}
		}

		for level in 0..num_levels {
			let (w, h) = level_dimensions(self.width, self.height, level);
			if w == 0 || h == 0 {
				return Err(TMXExportError::MipSize {
					level: level,
					width: w,
					height: h,
				});
			}

			let expected = w * h;
			let actual = self.data.level_len(level);
			if actual != expected {
				return Err(TMXExportError::DataSize {
					level: level,
					expected: expected,
					actual: actual,
				});
			}
		}

		if let TMXData::Indexed(levels) = &self.data {
			for level in levels {
				for index in level {
					if *index as usize >= palette_size {
						return Err(TMXExportError::IndexRange {
							format: self.pixel_format,
							index: *index,
						});
					}
				}
			}
		}

		Ok(())
	}

	/// Decodes one level through the selected palette into a [`Bitmap`].
	/// `None` selects the base image, `Some(k)` the k'th mip level.
	/// Panics when the palette or mip selection is out of range.
	pub fn to_raster(&self, palette_index: usize, mip_index: Option<usize>) -> Bitmap {
		let level = match mip_index {
			Some(mip) => mip + 1,
			None => 0,
		};
		let (w, h) = level_dimensions(self.width, self.height, level);

		match &self.data {
			TMXData::Direct(levels) => Bitmap::from_pixels(w, h, levels[level].clone()),
			TMXData::Indexed(levels) => Bitmap::indexed(
				w,
				h,
				self.palettes[palette_index].clone(),
				levels[level].clone(),
			),
		}
	}

	/// Header user id word, preserved from parse like the flag word
	pub fn user_id(&self) -> i16 {
		self.user_id
	}

	pub fn width(&self) -> u16 {
		self.width
	}

	pub fn height(&self) -> u16 {
		self.height
	}

	pub fn pixel_format(&self) -> PixelFormat {
		self.pixel_format
	}

	/// Storage format of the palette block, when the pixel format is indexed
	pub fn palette_format(&self) -> Option<PixelFormat> {
		if self.pixel_format.is_indexed() {
			PixelFormat::from_u8(self.palette_format)
		} else {
			None
		}
	}

	pub fn palettes(&self) -> &[Vec<Color>] {
		&self.palettes
	}

	pub fn palette_count(&self) -> usize {
		self.palettes.len()
	}

	/// 16 for 4 bit indexed formats, 256 for 8 bit, zero otherwise
	pub fn palette_color_count(&self) -> usize {
		self.pixel_format.palette_size()
	}

	pub fn data(&self) -> &TMXData {
		&self.data
	}

	/// Mip levels stored beyond the base image
	pub fn mip_count(&self) -> usize {
		self.data.num_levels() - 1
	}

	pub fn mip_kl(&self) -> u16 {
		self.mip_kl
	}

	/// Mip K factor: the low 12 bits as a signed fraction over 16
	pub fn mip_k(&self) -> f32 {
		(((self.mip_kl << 4) as i16) >> 4) as f32 / 16.0
	}

	/// Mip L factor from the top 4 bits; 3 while the field is unset
	pub fn mip_l(&self) -> u8 {
		if self.mip_kl == MIPKL_UNSET {
			3
		} else {
			(self.mip_kl >> 12) as u8
		}
	}

	pub fn user_comment(&self) -> &str {
		&self.user_comment
	}

	/// Replaces the comment, silently truncating to what the wire field holds
	pub fn set_user_comment(&mut self, comment: &str) {
		self.user_comment = truncate_comment(comment);
	}

	/// Repeat while the stored mode byte is the unset sentinel
	pub fn horizontal_wrap(&self) -> WrapMode {
		if self.wrap_modes == WRAP_UNSET {
			WrapMode::Repeat
		} else {
			WrapMode::from_bits(self.wrap_modes >> 2)
		}
	}

	pub fn vertical_wrap(&self) -> WrapMode {
		if self.wrap_modes == WRAP_UNSET {
			WrapMode::Repeat
		} else {
			WrapMode::from_bits(self.wrap_modes)
		}
	}

	/// No-op while the stored mode byte is the unset sentinel
	pub fn set_horizontal_wrap(&mut self, mode: WrapMode) {
		if self.wrap_modes != WRAP_UNSET {
			self.wrap_modes = self.wrap_modes & !0b1100 | (mode as u8) << 2;
		}
	}

	pub fn set_vertical_wrap(&mut self, mode: WrapMode) {
		if self.wrap_modes != WRAP_UNSET {
			self.wrap_modes = self.wrap_modes & !0b0011 | mode as u8;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;

	fn quad() -> Vec<Color> {
		vec![
			Color::new(255, 0, 0, 128),
			Color::new(0, 255, 0, 128),
			Color::new(0, 0, 255, 128),
			Color::opaque(255, 255, 255),
		]
	}

	fn write_to_vec(tmx: &TMXFile) -> Vec<u8> {
		let mut cur = Cursor::new(vec![]);
		tmx.write(&mut cur).unwrap();
		cur.into_inner()
	}

	#[test]
	fn test_direct_roundtrip() {
		let tmx = TMXFile::direct(2, 2, PixelFormat::PSMCT32, vec![quad()], None).unwrap();
		let bytes = write_to_vec(&tmx);

		// 16 byte header, 48 bytes of image fields, 2x2x4 bytes of pixels
		assert_eq!(bytes.len(), 80);
		assert_eq!(&bytes[64..68], &[0xFF, 0, 0, 0x40]);
		assert_eq!(&bytes[76..], &[0xFF, 0xFF, 0xFF, 0x80]);

		let back = TMXFile::read(&mut Cursor::new(bytes.clone())).unwrap();
		assert_eq!(back, tmx);
		assert_eq!(write_to_vec(&back), bytes);
	}

	#[test]
	fn test_header_layout() {
		let mut tmx = TMXFile::direct(2, 2, PixelFormat::PSMCT32, vec![quad()], None).unwrap();
		tmx.user_texture_id = -2;
		let bytes = write_to_vec(&tmx);

		assert_eq!(&bytes[0..2], &[0x02, 0x00]);
		assert_eq!(&bytes[2..4], &[0x00, 0x00]); // user id
		assert_eq!(&bytes[4..8], &(bytes.len() as i32).to_le_bytes());
		assert_eq!(&bytes[8..12], b"TMX0");
		assert_eq!(&bytes[12..16], &[0; 4]);
		assert_eq!(bytes[16], 0); // no palettes
		assert_eq!(&bytes[18..20], &[2, 0]); // width
		assert_eq!(bytes[22], PixelFormat::PSMCT32 as u8);
		assert_eq!(&bytes[24..26], &[0xFF, 0xFF]); // mip KL unset
		assert_eq!(bytes[27], 0xFF); // wrap modes unset
		assert_eq!(&bytes[28..32], &(-2i32).to_le_bytes());
	}

	#[test]
	fn test_user_id_preserved() {
		let tmx = TMXFile::direct(2, 2, PixelFormat::PSMCT32, vec![quad()], None).unwrap();
		let mut bytes = write_to_vec(&tmx);
		bytes[2] = 0x07;

		let back = TMXFile::read(&mut Cursor::new(bytes.clone())).unwrap();
		assert_eq!(back.user_id(), 7);
		assert_eq!(write_to_vec(&back), bytes);
	}

	#[test]
	fn test_round_trip_offset_base() {
		let tmx = TMXFile::direct(1, 1, PixelFormat::PSMCT24, vec![vec![Color::opaque(9, 8, 7)]], None).unwrap();

		let mut cur = Cursor::new(vec![0xEE; 10]);
		cur.set_position(10);
		tmx.write(&mut cur).unwrap();
		assert_eq!(cur.position(), 10 + 64 + 3);

		cur.set_position(10);
		let back = TMXFile::read(&mut cur).unwrap();
		assert_eq!(back, tmx);
	}

	#[test]
	fn test_indexed_psmt4_golden_bytes() {
		let palette: Vec<Color> = (0..16).map(|i| Color::opaque(i * 16, i * 8, i)).collect();
		let indices: Vec<u8> = (0..16).collect();
		let tmx = TMXFile::indexed(
			4,
			4,
			PixelFormat::PSMT4,
			PixelFormat::PSMCT32,
			vec![palette],
			vec![indices],
			None,
		)
		.unwrap();

		let bytes = write_to_vec(&tmx);
		// 64 bytes of framing, a 4x4 PSMCT32 palette block, 8 pixel bytes
		assert_eq!(bytes.len(), 64 + 64 + 8);
		assert_eq!(&bytes[128..], &[0x10, 0x32, 0x54, 0x76, 0x98, 0xBA, 0xDC, 0xFE]);

		let back = TMXFile::read(&mut Cursor::new(bytes)).unwrap();
		assert_eq!(back, tmx);
	}

	#[test]
	fn test_indexed_psmt8_multiple_palettes() {
		let palettes: Vec<Vec<Color>> = (0..2)
			.map(|p| (0..=255).map(|i| Color::new(i, p * 100, 0, 255)).collect())
			.collect();
		let indices: Vec<u8> = (0..64).collect();
		let tmx = TMXFile::indexed(
			16,
			4,
			PixelFormat::PSMT8,
			PixelFormat::PSMCT32,
			palettes,
			vec![indices],
			None,
		)
		.unwrap();

		let back = TMXFile::read(&mut Cursor::new(write_to_vec(&tmx))).unwrap();
		assert_eq!(back, tmx);
		assert_eq!(back.palette_count(), 2);
		assert_eq!(back.to_raster(1, None).pixel(3, 0), Color::new(3, 100, 0, 255));
	}

	#[test]
	fn test_mip_chain() {
		// the longest chain 16x16 supports: mips at /4, /8, /12 and /16
		let mut levels = vec![];
		for level in 0..5 {
			let (w, h) = level_dimensions(16, 16, level);
			levels.push(vec![Color::opaque(level as u8 * 10, 0, 0); w * h]);
		}

		let tmx = TMXFile::direct(16, 16, PixelFormat::PSMCT32, levels, None).unwrap();
		assert_eq!(tmx.mip_count(), 4);

		let back = TMXFile::read(&mut Cursor::new(write_to_vec(&tmx))).unwrap();
		assert_eq!(back, tmx);

		let mip = back.to_raster(0, Some(0));
		assert_eq!((mip.width, mip.height), (4, 4));
		assert_eq!(mip.pixel(0, 0), Color::opaque(10, 0, 0));
		let mip = back.to_raster(0, Some(1));
		assert_eq!((mip.width, mip.height), (2, 2));
	}

	#[test]
	fn test_degenerate_mip_rejected_on_encode() {
		// the third mip of an 8x8 image would be 8/12 x 8/12 = 0x0
		let mut levels = vec![vec![Color::default(); 64], vec![Color::default(); 4], vec![Color::default(); 1]];
		levels.push(vec![]);

		let err = TMXFile::direct(8, 8, PixelFormat::PSMCT32, levels, None).unwrap_err();
		assert!(matches!(err, TMXExportError::MipSize { level: 3, .. }));
	}

	#[test]
	fn test_too_many_palettes_rejected() {
		let palettes = vec![vec![Color::default(); 256]; 256];
		let err = TMXFile::indexed(
			1,
			1,
			PixelFormat::PSMT8,
			PixelFormat::PSMCT32,
			palettes,
			vec![vec![0]],
			None,
		)
		.unwrap_err();
		assert!(matches!(err, TMXExportError::PaletteCount { count: 256, .. }));
	}

	#[test]
	fn test_level_size_mismatch_rejected() {
		let err = TMXFile::direct(2, 2, PixelFormat::PSMCT32, vec![vec![Color::default(); 3]], None)
			.unwrap_err();
		assert!(matches!(err, TMXExportError::DataSize { expected: 4, actual: 3, .. }));
	}

	#[test]
	fn test_comment_truncation() {
		let long = "A".repeat(40);
		let tmx = TMXFile::direct(
			1,
			1,
			PixelFormat::PSMCT32,
			vec![vec![Color::default()]],
			Some(&long),
		)
		.unwrap();
		assert_eq!(tmx.user_comment(), "A".repeat(27));

		let back = TMXFile::read(&mut Cursor::new(write_to_vec(&tmx))).unwrap();
		assert_eq!(back.user_comment(), "A".repeat(27));
	}

	#[test]
	fn test_comment_boundaries() {
		for len in [0, 13, 27] {
			let comment = "x".repeat(len);
			let mut tmx = TMXFile::direct(
				1,
				1,
				PixelFormat::PSMCT32,
				vec![vec![Color::default()]],
				None,
			)
			.unwrap();
			tmx.set_user_comment(&comment);

			let back = TMXFile::read(&mut Cursor::new(write_to_vec(&tmx))).unwrap();
			assert_eq!(back.user_comment(), comment);
		}
	}

	#[test]
	fn test_unset_sentinels() {
		let tmx = TMXFile::direct(1, 1, PixelFormat::PSMCT32, vec![vec![Color::default()]], None)
			.unwrap();

		assert_eq!(tmx.mip_kl(), 0xFFFF);
		assert_eq!(tmx.mip_k(), -0.0625);
		assert_eq!(tmx.mip_l(), 3);
		assert_eq!(tmx.horizontal_wrap(), WrapMode::Repeat);
		assert_eq!(tmx.vertical_wrap(), WrapMode::Repeat);

		let mut back = TMXFile::read(&mut Cursor::new(write_to_vec(&tmx))).unwrap();
		assert_eq!(back.mip_kl(), 0xFFFF);

		// writes are ignored while the sentinel is stored
		back.set_horizontal_wrap(WrapMode::Clamp);
		assert_eq!(back.horizontal_wrap(), WrapMode::Repeat);
		assert_eq!(write_to_vec(&back)[27], 0xFF);
	}

	#[test]
	fn test_wrap_modes_stored() {
		let tmx = TMXFile::direct(1, 1, PixelFormat::PSMCT32, vec![vec![Color::default()]], None)
			.unwrap();
		let mut bytes = write_to_vec(&tmx);
		bytes[27] = 0;

		let mut back = TMXFile::read(&mut Cursor::new(bytes)).unwrap();
		assert_eq!(back.horizontal_wrap(), WrapMode::Repeat);

		back.set_horizontal_wrap(WrapMode::Clamp);
		assert_eq!(back.horizontal_wrap(), WrapMode::Clamp);
		assert_eq!(back.vertical_wrap(), WrapMode::Repeat);
		assert_eq!(write_to_vec(&back)[27], 0b0100);
	}

	#[test]
	fn test_mip_kl_accessors() {
		let tmx = TMXFile::direct(1, 1, PixelFormat::PSMCT32, vec![vec![Color::default()]], None)
			.unwrap();
		let mut bytes = write_to_vec(&tmx);

		// mip KL = 0x3010: L = 3, K = 16/16
		bytes[24] = 0x10;
		bytes[25] = 0x30;
		let back = TMXFile::read(&mut Cursor::new(bytes.clone())).unwrap();
		assert_eq!(back.mip_k(), 1.0);
		assert_eq!(back.mip_l(), 3);

		// mip KL = 0x0FFF: L = 0, K = -1/16
		bytes[24] = 0xFF;
		bytes[25] = 0x0F;
		let back = TMXFile::read(&mut Cursor::new(bytes)).unwrap();
		assert_eq!(back.mip_k(), -0.0625);
		assert_eq!(back.mip_l(), 0);
	}

	#[test]
	fn test_wrong_magic() {
		let tmx = TMXFile::direct(1, 1, PixelFormat::PSMCT32, vec![vec![Color::default()]], None)
			.unwrap();
		let mut bytes = write_to_vec(&tmx);
		bytes[11] = b'1';

		let err = TMXFile::read(&mut Cursor::new(bytes)).unwrap_err();
		assert!(matches!(err, TMXImportError::Magic(_)));
	}

	#[test]
	fn test_truncated_payload() {
		let tmx = TMXFile::direct(2, 2, PixelFormat::PSMCT32, vec![quad()], None).unwrap();
		let mut bytes = write_to_vec(&tmx);
		bytes.truncate(70);

		let err = TMXFile::read(&mut Cursor::new(bytes)).unwrap_err();
		assert!(matches!(err, TMXImportError::IO { .. }));
	}

	#[test]
	fn test_psmz32_reads_like_psmct32() {
		let tmx = TMXFile::direct(2, 2, PixelFormat::PSMCT32, vec![quad()], None).unwrap();
		let mut bytes = write_to_vec(&tmx);
		bytes[22] = PixelFormat::PSMZ32 as u8;

		let back = TMXFile::read(&mut Cursor::new(bytes)).unwrap();
		assert_eq!(back.pixel_format(), PixelFormat::PSMZ32);
		assert_eq!(back.to_raster(0, None).pixels, tmx.to_raster(0, None).pixels);
	}

	#[test]
	fn test_palette_count_invariant() {
		let tmx = TMXFile::direct(1, 1, PixelFormat::PSMCT32, vec![vec![Color::default()]], None)
			.unwrap();
		let mut bytes = write_to_vec(&tmx);
		bytes[16] = 1; // direct format claiming a palette

		let err = TMXFile::read(&mut Cursor::new(bytes)).unwrap_err();
		assert!(matches!(err, TMXImportError::PaletteCount { .. }));
	}

	#[test]
	fn test_one_by_one_every_format() {
		for format in [
			PixelFormat::PSMCT32,
			PixelFormat::PSMCT24,
			PixelFormat::PSMCT16,
			PixelFormat::PSMCT16S,
			PixelFormat::PSMZ32,
			PixelFormat::PSMZ24,
			PixelFormat::PSMZ16,
			PixelFormat::PSMZ16S,
			PixelFormat::PSMT8,
			PixelFormat::PSMT8H,
			PixelFormat::PSMT4,
			PixelFormat::PSMT4HL,
			PixelFormat::PSMT4HH,
		] {
			let tmx = if format.is_indexed() {
				let palette = (0..format.palette_size())
					.map(|i| Color::opaque(i as u8, 0, 0))
					.collect();
				TMXFile::indexed(1, 1, format, PixelFormat::PSMCT32, vec![palette], vec![vec![0]], None)
			} else {
				TMXFile::direct(1, 1, format, vec![vec![Color::opaque(248, 8, 16)]], None)
			}
			.unwrap();

			let back = TMXFile::read(&mut Cursor::new(write_to_vec(&tmx))).unwrap();
			assert_eq!(back, tmx, "{:?}", format);
		}
	}

	#[test]
	fn test_from_raster_direct() {
		let pixels = quad();
		let bmp = Bitmap::from_pixels(2, 2, pixels.clone());
		let tmx = TMXFile::from_raster(&bmp, PixelFormat::PSMCT32, Some("quad")).unwrap();

		assert_eq!(tmx.user_comment(), "quad");
		assert_eq!(tmx.to_raster(0, None).pixels, pixels);
	}

	#[test]
	fn test_from_raster_uses_embedded_palette() {
		let palette: Vec<Color> = (0..16).map(|i| Color::opaque(i * 16, 0, 0)).collect();
		let bmp = Bitmap::indexed(4, 4, palette.clone(), (0..16).collect());
		let tmx = TMXFile::from_raster(&bmp, PixelFormat::PSMT4, None).unwrap();

		assert_eq!(tmx.palettes()[0], palette);
		assert_eq!(tmx.to_raster(0, None).pixels, bmp.pixels);
	}

	#[test]
	fn test_from_raster_quantizes() {
		let pixels = vec![
			Color::opaque(255, 0, 0),
			Color::opaque(0, 255, 0),
			Color::opaque(0, 0, 255),
			Color::opaque(255, 255, 0),
		];
		let bmp = Bitmap::from_pixels(2, 2, pixels.clone());
		let tmx = TMXFile::from_raster(&bmp, PixelFormat::PSMT8, None).unwrap();

		assert_eq!(tmx.palette_count(), 1);
		assert_eq!(tmx.palettes()[0].len(), 256);
		assert_eq!(tmx.to_raster(0, None).pixels, pixels);

		let back = TMXFile::read(&mut Cursor::new(write_to_vec(&tmx))).unwrap();
		assert_eq!(back, tmx);
	}
}
