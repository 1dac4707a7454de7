use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TitleGenError};

/// Character vocabulary of a corpus.
///
/// Holds the distinct characters of a text sorted by code point, and the two
/// lookup tables between characters and their indices `0..len()`.
///
/// The order is deterministic: the same text always yields the same index
/// assignment, which is what makes a trained model's output indices
/// meaningful. Serialized as the sorted character list only; the lookup
/// table is rebuilt on load.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "Vec<char>", into = "Vec<char>")]
pub struct Vocabulary {
	/// index → character
	chars: Vec<char>,
	/// character → index
	indices: HashMap<char, usize>,
}

impl Vocabulary {
	/// Extracts the vocabulary of `text`.
	///
	/// An empty text yields an empty vocabulary.
	pub fn build(text: &str) -> Self {
		let distinct: BTreeSet<char> = text.chars().collect();
		Self::from(distinct.into_iter().collect::<Vec<_>>())
	}

	/// Number of distinct characters.
	pub fn len(&self) -> usize {
		self.chars.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chars.is_empty()
	}

	/// Sorted characters, indexed by their vocabulary index.
	pub fn chars(&self) -> &[char] {
		&self.chars
	}

	/// Index of `c`, if present.
	pub fn index_of(&self, c: char) -> Option<usize> {
		self.indices.get(&c).copied()
	}

	/// Character at `index`, if present.
	pub fn char_at(&self, index: usize) -> Option<char> {
		self.chars.get(index).copied()
	}

	/// Converts a string into vocabulary indices.
	///
	/// # Errors
	/// Returns `UnknownCharacter` for the first character not in the vocabulary.
	pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
		text.chars()
			.map(|c| self.index_of(c).ok_or(TitleGenError::UnknownCharacter(c)))
			.collect()
	}

	/// Converts vocabulary indices back into a string.
	///
	/// # Errors
	/// Returns `UnknownIndex` for the first index outside the vocabulary.
	pub fn decode(&self, indices: &[usize]) -> Result<String> {
		indices
			.iter()
			.map(|&index| {
				self.char_at(index).ok_or(TitleGenError::UnknownIndex {
					index,
					size: self.len(),
				})
			})
			.collect()
	}
}

impl From<Vec<char>> for Vocabulary {
	/// Builds the lookup tables from a character list.
	///
	/// The list is sorted and deduplicated first, so a list read from a
	/// checkpoint cannot break the ordering invariant.
	fn from(mut chars: Vec<char>) -> Self {
		chars.sort_unstable();
		chars.dedup();
		let indices = chars.iter().enumerate().map(|(i, c)| (*c, i)).collect();
		Self { chars, indices }
	}
}

impl From<Vocabulary> for Vec<char> {
	fn from(vocabulary: Vocabulary) -> Self {
		vocabulary.chars
	}
}
