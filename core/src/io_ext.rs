use std::io::{
	Read,
	Result,
	Seek,
	SeekFrom,
	Write
};

pub trait ReadBinExt: Read {
	/// Reads a fixed-length NUL-padded string field
	#[inline]
	fn read_fixed_cstr(&mut self, len: usize) -> Result<String> {
		let mut buf = vec![0; len];
		self.read_exact(&mut buf)?;

		let end = buf.iter().position(|b| *b == 0).unwrap_or(len);
		Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
	}
}

impl<R> ReadBinExt for R
where
	R: Read + ?Sized,
{
}

pub trait WriteBinExt: Write {
	/// Writes a string as a fixed-length NUL-padded field.
	/// Strings longer than `len - 1` bytes are truncated on a character boundary.
	#[inline]
	fn write_fixed_cstr(&mut self, s: &str, len: usize) -> Result<()> {
		let mut end = s.len().min(len - 1);
		while !s.is_char_boundary(end) {
			end -= 1;
		}

		self.write_all(&s.as_bytes()[..end])?;
		self.write_all(&vec![0; len - end])
	}
}

impl<W> WriteBinExt for W
where
	W: Write + ?Sized,
{
}

pub trait SeekBinExt: Seek {
	/// Advances to the next `alignment`-byte boundary relative to `base`,
	/// returning the aligned position
	#[inline]
	fn align_to(&mut self, base: u64, alignment: u64) -> Result<u64> {
		let pos = self.stream_position()?;
		let rem = (pos - base) % alignment;

		if rem == 0 {
			Ok(pos)
		} else {
			self.seek(SeekFrom::Current((alignment - rem) as i64))
		}
	}
}

impl<S> SeekBinExt for S
where
	S: Seek + ?Sized,
{
}
