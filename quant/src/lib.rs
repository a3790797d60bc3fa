//! Wu's color quantizer: a 33x33x33 moment histogram over the RGB cube,
//! split greedily along variance-minimizing planes until the requested
//! palette size is reached.

use ptk_core::texture::Color;
use thiserror::Error;

const SIDE: usize = 33;
const CELLS: usize = SIDE * SIDE * SIDE;

#[derive(Debug, Error)]
pub enum QuantizerError {
	#[error("Cannot build a {requested} color palette from {distinct} occupied histogram cells")]
	TooFewColors {
		requested: usize,
		distinct: usize,
	},
}

#[derive(Clone, Copy, Debug)]
pub struct QuantizerOptions {
	/// Palette entries to aim for; the result may be shorter when the
	/// input holds fewer distinct colors
	pub max_colors: usize,
	/// Pixels with alpha below this snap to a transparent entry at
	/// palette index 0; zero disables the snap
	pub alpha_threshold: u8,
	/// Dithering level; level 1 performs no dithering
	pub dither: u8,
}

impl Default for QuantizerOptions {
	fn default() -> QuantizerOptions {
		QuantizerOptions {
			max_colors: 256,
			alpha_threshold: 0,
			dither: 1,
		}
	}
}

#[derive(Clone, Debug)]
pub struct Quantized {
	pub palette: Vec<Color>,
	pub indices: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Axis {
	Red,
	Green,
	Blue,
}

/// Histogram cell moments, cumulated in place into 3-D prefix sums so any
/// box over the cube can be summed from its eight corners
struct Moments {
	wt: Vec<i64>,
	mr: Vec<i64>,
	mg: Vec<i64>,
	mb: Vec<i64>,
	ma: Vec<i64>,
	m2: Vec<f64>,
}

const fn index(r: usize, g: usize, b: usize) -> usize {
	(r * SIDE + g) * SIDE + b
}

impl Moments {
	fn new() -> Moments {
		Moments {
			wt: vec![0; CELLS],
			mr: vec![0; CELLS],
			mg: vec![0; CELLS],
			mb: vec![0; CELLS],
			ma: vec![0; CELLS],
			m2: vec![0.0; CELLS],
		}
	}

	fn record(&mut self, color: Color) {
		let i = index(
			((color.red >> 3) + 1) as usize,
			((color.green >> 3) + 1) as usize,
			((color.blue >> 3) + 1) as usize,
		);
		let (r, g, b) = (color.red as f64, color.green as f64, color.blue as f64);

		self.wt[i] += 1;
		self.mr[i] += color.red as i64;
		self.mg[i] += color.green as i64;
		self.mb[i] += color.blue as i64;
		self.ma[i] += color.alpha as i64;
		self.m2[i] += r * r + g * g + b * b;
	}

	fn occupied(&self) -> usize {
		self.wt.iter().filter(|w| **w > 0).count()
	}

	fn cumulate(&mut self) {
		for r in 1..SIDE {
			let mut area_w = [0i64; SIDE];
			let mut area_r = [0i64; SIDE];
			let mut area_g = [0i64; SIDE];
			let mut area_b = [0i64; SIDE];
			let mut area_a = [0i64; SIDE];
			let mut area2 = [0f64; SIDE];

			for g in 1..SIDE {
				let mut line_w = 0i64;
				let mut line_r = 0i64;
				let mut line_g = 0i64;
				let mut line_b = 0i64;
				let mut line_a = 0i64;
				let mut line2 = 0f64;

				for b in 1..SIDE {
					let i = index(r, g, b);
					let j = index(r - 1, g, b);

					line_w += self.wt[i];
					line_r += self.mr[i];
					line_g += self.mg[i];
					line_b += self.mb[i];
					line_a += self.ma[i];
					line2 += self.m2[i];

					area_w[b] += line_w;
					area_r[b] += line_r;
					area_g[b] += line_g;
					area_b[b] += line_b;
					area_a[b] += line_a;
					area2[b] += line2;

					self.wt[i] = self.wt[j] + area_w[b];
					self.mr[i] = self.mr[j] + area_r[b];
					self.mg[i] = self.mg[j] + area_g[b];
					self.mb[i] = self.mb[j] + area_b[b];
					self.ma[i] = self.ma[j] + area_a[b];
					self.m2[i] = self.m2[j] + area2[b];
				}
			}
		}
	}
}

/// A box over the histogram cube; bounds are exclusive below, inclusive above
#[derive(Clone, Copy, Debug, Default)]
struct Cube {
	r0: usize,
	r1: usize,
	g0: usize,
	g1: usize,
	b0: usize,
	b1: usize,
	vol: i64,
}

fn volume(c: &Cube, m: &[i64]) -> i64 {
	m[index(c.r1, c.g1, c.b1)] - m[index(c.r1, c.g1, c.b0)]
		- m[index(c.r1, c.g0, c.b1)] + m[index(c.r1, c.g0, c.b0)]
		- m[index(c.r0, c.g1, c.b1)] + m[index(c.r0, c.g1, c.b0)]
		+ m[index(c.r0, c.g0, c.b1)] - m[index(c.r0, c.g0, c.b0)]
}

fn volume2(c: &Cube, m: &[f64]) -> f64 {
	m[index(c.r1, c.g1, c.b1)] - m[index(c.r1, c.g1, c.b0)]
		- m[index(c.r1, c.g0, c.b1)] + m[index(c.r1, c.g0, c.b0)]
		- m[index(c.r0, c.g1, c.b1)] + m[index(c.r0, c.g1, c.b0)]
		+ m[index(c.r0, c.g0, c.b1)] - m[index(c.r0, c.g0, c.b0)]
}

/// Sum over the part of the box below the cut axis' lower bound plane
fn bottom(c: &Cube, dir: Axis, m: &[i64]) -> i64 {
	match dir {
		Axis::Red => {
			-m[index(c.r0, c.g1, c.b1)] + m[index(c.r0, c.g1, c.b0)]
				+ m[index(c.r0, c.g0, c.b1)] - m[index(c.r0, c.g0, c.b0)]
		},
		Axis::Green => {
			-m[index(c.r1, c.g0, c.b1)] + m[index(c.r1, c.g0, c.b0)]
				+ m[index(c.r0, c.g0, c.b1)] - m[index(c.r0, c.g0, c.b0)]
		},
		Axis::Blue => {
			-m[index(c.r1, c.g1, c.b0)] + m[index(c.r1, c.g0, c.b0)]
				+ m[index(c.r0, c.g1, c.b0)] - m[index(c.r0, c.g0, c.b0)]
		},
	}
}

/// Sum over the part of the box up to a candidate cut plane at `pos`
fn top(c: &Cube, dir: Axis, pos: usize, m: &[i64]) -> i64 {
	match dir {
		Axis::Red => {
			m[index(pos, c.g1, c.b1)] - m[index(pos, c.g1, c.b0)]
				- m[index(pos, c.g0, c.b1)] + m[index(pos, c.g0, c.b0)]
		},
		Axis::Green => {
			m[index(c.r1, pos, c.b1)] - m[index(c.r1, pos, c.b0)]
				- m[index(c.r0, pos, c.b1)] + m[index(c.r0, pos, c.b0)]
		},
		Axis::Blue => {
			m[index(c.r1, c.g1, pos)] - m[index(c.r1, c.g0, pos)]
				- m[index(c.r0, c.g1, pos)] + m[index(c.r0, c.g0, pos)]
		},
	}
}

fn sq_sum(r: i64, g: i64, b: i64) -> f64 {
	let (r, g, b) = (r as f64, g as f64, b as f64);
	r * r + g * g + b * b
}

/// Weighted variance of the colors inside the box
fn variance(c: &Cube, mo: &Moments) -> f64 {
	let w = volume(c, &mo.wt);
	if w == 0 {
		return 0.0;
	}

	let part = sq_sum(volume(c, &mo.mr), volume(c, &mo.mg), volume(c, &mo.mb));
	volume2(c, &mo.m2) - part / w as f64
}

struct Sums {
	r: i64,
	g: i64,
	b: i64,
	w: i64,
}

/// Scans candidate cut planes along `dir`, returning the best score and
/// plane position, if any plane leaves weight on both sides
fn maximize(
	c: &Cube,
	dir: Axis,
	first: usize,
	last: usize,
	whole: &Sums,
	mo: &Moments,
) -> (f64, Option<usize>) {
	let base_r = bottom(c, dir, &mo.mr);
	let base_g = bottom(c, dir, &mo.mg);
	let base_b = bottom(c, dir, &mo.mb);
	let base_w = bottom(c, dir, &mo.wt);

	let mut max = 0.0;
	let mut cut = None;

	for i in first..last {
		let half_r = base_r + top(c, dir, i, &mo.mr);
		let half_g = base_g + top(c, dir, i, &mo.mg);
		let half_b = base_b + top(c, dir, i, &mo.mb);
		let half_w = base_w + top(c, dir, i, &mo.wt);
		if half_w == 0 {
			continue;
		}

		let rest_w = whole.w - half_w;
		if rest_w == 0 {
			continue;
		}

		let mut temp = sq_sum(half_r, half_g, half_b) / half_w as f64;
		temp += sq_sum(whole.r - half_r, whole.g - half_g, whole.b - half_b) / rest_w as f64;

		if temp > max {
			max = temp;
			cut = Some(i);
		}
	}

	(max, cut)
}

/// Splits `set1` along its best axis, leaving the upper part in `set2`.
/// Returns false when no plane separates the box's weight.
fn cut(set1: &mut Cube, set2: &mut Cube, mo: &Moments) -> bool {
	let whole = Sums {
		r: volume(set1, &mo.mr),
		g: volume(set1, &mo.mg),
		b: volume(set1, &mo.mb),
		w: volume(set1, &mo.wt),
	};

	let (max_r, cut_r) = maximize(set1, Axis::Red, set1.r0 + 1, set1.r1, &whole, mo);
	let (max_g, cut_g) = maximize(set1, Axis::Green, set1.g0 + 1, set1.g1, &whole, mo);
	let (max_b, cut_b) = maximize(set1, Axis::Blue, set1.b0 + 1, set1.b1, &whole, mo);

	let (dir, at) = if max_r >= max_g && max_r >= max_b {
		match cut_r {
			Some(i) => (Axis::Red, i),
			None => return false,
		}
	} else if max_g >= max_r && max_g >= max_b {
		match cut_g {
			Some(i) => (Axis::Green, i),
			None => return false,
		}
	} else {
		match cut_b {
			Some(i) => (Axis::Blue, i),
			None => return false,
		}
	};

	set2.r1 = set1.r1;
	set2.g1 = set1.g1;
	set2.b1 = set1.b1;

	match dir {
		Axis::Red => {
			set2.r0 = at;
			set1.r1 = at;
			set2.g0 = set1.g0;
			set2.b0 = set1.b0;
		},
		Axis::Green => {
			set2.g0 = at;
			set1.g1 = at;
			set2.r0 = set1.r0;
			set2.b0 = set1.b0;
		},
		Axis::Blue => {
			set2.b0 = at;
			set1.b1 = at;
			set2.r0 = set1.r0;
			set2.g0 = set1.g0;
		},
	}

	set1.vol = ((set1.r1 - set1.r0) * (set1.g1 - set1.g0) * (set1.b1 - set1.b0)) as i64;
	set2.vol = ((set2.r1 - set2.r0) * (set2.g1 - set2.g0) * (set2.b1 - set2.b0)) as i64;
	true
}

/// Splits the full cube into up to `max_boxes` boxes, always cutting the
/// box with the largest weighted variance next
fn split(mo: &Moments, max_boxes: usize) -> Vec<Cube> {
	let mut cubes = vec![Cube {
		r0: 0,
		r1: SIDE - 1,
		g0: 0,
		g1: SIDE - 1,
		b0: 0,
		b1: SIDE - 1,
		vol: ((SIDE - 1) * (SIDE - 1) * (SIDE - 1)) as i64,
	}];
	let mut vv = vec![0.0f64];
	let mut next = 0;

	while cubes.len() < max_boxes {
		let mut set1 = cubes[next];
		let mut set2 = Cube::default();

		if cut(&mut set1, &mut set2, mo) {
			vv[next] = if set1.vol > 1 { variance(&set1, mo) } else { 0.0 };
			cubes[next] = set1;
			vv.push(if set2.vol > 1 { variance(&set2, mo) } else { 0.0 });
			cubes.push(set2);
		} else {
			vv[next] = 0.0;
		}

		let mut best = 0.0;
		next = 0;
		for (k, v) in vv.iter().enumerate() {
			if *v > best {
				best = *v;
				next = k;
			}
		}
		if best <= 0.0 {
			break;
		}
	}

	cubes
}

/// Mean color of the box, or [`None`] for a box holding no pixels
fn centroid(c: &Cube, mo: &Moments) -> Option<Color> {
	let w = volume(c, &mo.wt);
	if w == 0 {
		return None;
	}

	let mean = |m: &[i64]| (volume(c, m) as f64 / w as f64).round() as u8;
	Some(Color::new(mean(&mo.mr), mean(&mo.mg), mean(&mo.mb), mean(&mo.ma)))
}

/// Returns the index of the palette entry nearest to `color` in squared
/// RGB distance. Ties resolve to the lowest index.
pub fn nearest_index(palette: &[Color], color: Color) -> usize {
	let mut best = 0;
	let mut best_dist = u32::MAX;

	for (i, entry) in palette.iter().enumerate() {
		let dr = entry.red as i32 - color.red as i32;
		let dg = entry.green as i32 - color.green as i32;
		let db = entry.blue as i32 - color.blue as i32;
		let dist = (dr * dr + dg * dg + db * db) as u32;

		if dist < best_dist {
			best_dist = dist;
			best = i;
		}
	}

	best
}

/// Reduces a true-color raster to a palette plus one index per pixel.
/// Quantization operates on RGB; each palette entry carries the rounded
/// mean alpha of the pixels that landed in its box.
pub fn quantize(pixels: &[Color], opts: &QuantizerOptions) -> Result<Quantized, QuantizerError> {
	let snap = opts.alpha_threshold > 0;
	// indices are bytes, so a palette never exceeds 256 entries
	let target = if snap {
		opts.max_colors.saturating_sub(1).min(255)
	} else {
		opts.max_colors.min(256)
	};

	let mut mo = Moments::new();
	for px in pixels {
		if snap && px.alpha < opts.alpha_threshold {
			continue;
		}
		mo.record(*px);
	}

	let occupied = mo.occupied();
	if opts.max_colors == 0 || pixels.is_empty() {
		return Err(QuantizerError::TooFewColors {
			requested: opts.max_colors,
			distinct: occupied,
		});
	}

	let mut palette = vec![];
	if snap {
		palette.push(Color::default());
	}

	if occupied > 0 && target > 0 {
		mo.cumulate();
		for cube in split(&mo, target) {
			if let Some(color) = centroid(&cube, &mo) {
				palette.push(color);
			}
		}
	}

	let first = if snap { 1 } else { 0 };
	let indices = pixels
		.iter()
		.map(|px| {
			if palette.len() <= first || (snap && px.alpha < opts.alpha_threshold) {
				0
			} else {
				(first + nearest_index(&palette[first..], *px)) as u8
			}
		})
		.collect();

	Ok(Quantized {
		palette: palette,
		indices: indices,
	})
}
