//! This module provides the [`Blob`] struct, a wrapper around [`Vec<u8>`] that provides additional methods
//! for working with byte data.
//!
//! # Overview
//!
//! The [`Blob`] struct is a simple wrapper around a `Vec<u8>` that provides methods for creating, accessing,
//! and manipulating byte data.
//!
//! # Examples
//!
//! ```rust
//! use lod_core::Blob;
//!
//! // Creating a new Blob from a vector of bytes
//! let vec = vec![0, 1, 2, 3, 4, 5, 6, 7];
//! let blob = Blob::from(&vec);
//! assert_eq!(blob.len(), 8);
//! assert_eq!(blob.range(2..5), &vec![2, 3, 4]);
//! assert_eq!(blob.clone().into_vec(), vec);
//!
//! // Creating a new Blob from a string
//! let text = String::from("Xylofön");
//! let blob = Blob::from(&text);
//! assert_eq!(blob.as_str(), "Xylofön");
//! ```

use std::fmt::Debug;
use std::ops::Range;

/// A simple wrapper around [`Vec<u8>`] that provides additional methods for working with byte data.
///
/// # Examples
///
/// ```rust
/// use lod_core::Blob;
///
/// // Create a Blob from a string
/// let blob = Blob::from("Hello, world!");
/// assert_eq!(blob.len(), 13);
/// assert_eq!(blob.as_str(), "Hello, world!");
///
/// // Create a Blob from a byte slice
/// let bytes = &[0x41, 0x42, 0x43];
/// let blob2 = Blob::from(bytes);
/// assert_eq!(blob2.as_str(), "ABC");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob(Vec::new())
	}

	/// Returns a byte slice from the specified `range`.
	///
	/// # Panics
	///
	/// Panics if the specified range is out of bounds.
	#[must_use]
	pub fn range(&self, range: Range<usize>) -> &[u8] {
		&self.0[range]
	}

	/// Returns a reference to the underlying byte slice.
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		self.0.as_ref()
	}

	/// Consumes this [`Blob`] and returns the underlying `Vec<u8>`.
	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Returns the underlying bytes as a string slice (`&str`), assuming they represent valid UTF-8 encoded text.
	///
	/// # Panics
	///
	/// Panics if the bytes are not valid UTF-8.
	#[must_use]
	pub fn as_str(&self) -> &str {
		std::str::from_utf8(&self.0).expect("Blob content was not valid UTF-8")
	}

	/// Returns the length of the underlying byte slice.
	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	/// Returns `true` if the underlying byte slice is empty, `false` otherwise.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

// Conversion implementations
impl From<Vec<u8>> for Blob {
	fn from(item: Vec<u8>) -> Self {
		Blob(item)
	}
}

impl From<&Vec<u8>> for Blob {
	fn from(item: &Vec<u8>) -> Self {
		Blob(item.clone())
	}
}

impl From<&[u8]> for Blob {
	fn from(item: &[u8]) -> Self {
		Blob(item.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(item: &[u8; N]) -> Self {
		Blob(item.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(item: &str) -> Self {
		Blob(item.as_bytes().to_vec())
	}
}

impl From<&String> for Blob {
	fn from(item: &String) -> Self {
		Blob(item.as_bytes().to_vec())
	}
}

impl From<String> for Blob {
	fn from(item: String) -> Self {
		Blob(item.into_bytes())
	}
}

/// Implements [`Debug`] by printing the byte length and a hex dump of the bytes.
impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let hex = self.0.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ");
		write!(f, "Blob({}): {hex}", self.0.len())
	}
}

/// Implements [`std::fmt::Display`] by printing the (lossy) UTF-8 interpretation of the bytes.
impl std::fmt::Display for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", String::from_utf8_lossy(&self.0))
	}
}

impl Default for Blob {
	fn default() -> Self {
		Self::new_empty()
	}
}
