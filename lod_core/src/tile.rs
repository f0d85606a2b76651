//! Tile coordinates and the children/descendants relation used by bulk
//! cache operations.

use std::fmt;

/// A single `(zoom, x, y)` tile coordinate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tile {
	pub z: u8,
	pub x: u32,
	pub y: u32,
}

impl Tile {
	pub fn new(z: u8, x: u32, y: u32) -> Self {
		Self { z, x, y }
	}

	/// The four tiles one zoom level below this one.
	pub fn children(&self) -> [Tile; 4] {
		let z = self.z + 1;
		let x = self.x * 2;
		let y = self.y * 2;
		[
			Tile::new(z, x, y),
			Tile::new(z, x + 1, y),
			Tile::new(z, x, y + 1),
			Tile::new(z, x + 1, y + 1),
		]
	}

	/// This tile plus every descendant down to (and including) `max_zoom`.
	/// If `self.z > max_zoom`, returns just `self`.
	pub fn deep_children(&self, max_zoom: u8) -> Vec<Tile> {
		let mut out = vec![*self];
		if self.z >= max_zoom {
			return out;
		}

		let mut frontier = vec![*self];
		let mut z = self.z;
		while z < max_zoom {
			let mut next = Vec::with_capacity(frontier.len() * 4);
			for tile in &frontier {
				next.extend(tile.children());
			}
			out.extend(next.iter().copied());
			frontier = next;
			z += 1;
		}

		out
	}
}

impl fmt::Display for Tile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.z, self.x, self.y)
	}
}
