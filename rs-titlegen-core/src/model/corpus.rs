use std::collections::HashSet;
use std::path::Path;

use log::info;

use crate::error::{Result, TitleGenError};
use crate::io::read_records;

/// Separator placed between two records of the corpus.
///
/// Generated text is split on this character to extract titles.
pub const RECORD_SEPARATOR: char = '\n';

/// Immutable training corpus.
///
/// A `Corpus` is the concatenation of source records (titles), joined by
/// [`RECORD_SEPARATOR`]. The text is also kept as a `Vec<char>` so windows
/// can be cut by character offset, UTF-8 safe.
///
/// # Invariants
/// - Built from at least one record
/// - Never mutated once built
#[derive(Clone, Debug)]
pub struct Corpus {
	text: String,
	chars: Vec<char>,
	/// Lowercased source records
	records: HashSet<String>,
}

impl Corpus {
	/// Builds a corpus from a sequence of records.
	///
	/// At most `limit` records are taken (all of them when `None`).
	///
	/// # Errors
	/// Returns `EmptyCorpus` if no record is supplied.
	pub fn from_records<I, S>(records: I, limit: Option<usize>) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let limit = limit.unwrap_or(usize::MAX);
		let records: Vec<String> = records.into_iter().take(limit).map(Into::into).collect();
		if records.is_empty() {
			return Err(TitleGenError::EmptyCorpus);
		}

		let text = records.join(&RECORD_SEPARATOR.to_string());
		let chars = text.chars().collect();

		Ok(Self {
			text,
			chars,
			records: records.iter().map(|record| record.to_lowercase()).collect(),
		})
	}

	/// Loads a corpus from a text file, one record per line.
	///
	/// Lines are trimmed of surrounding whitespace.
	///
	/// # Errors
	/// - I/O errors while reading the file
	/// - `EmptyCorpus` if the file has no lines
	pub fn from_file<P: AsRef<Path>>(filepath: P, limit: Option<usize>) -> Result<Self> {
		let records = read_records(&filepath)?;
		let corpus = Self::from_records(records, limit)?;
		info!(
			"Loaded corpus from {}: {} distinct records, {} characters",
			filepath.as_ref().display(),
			corpus.records.len(),
			corpus.len()
		);
		Ok(corpus)
	}

	/// Full corpus text.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Corpus characters, in order.
	pub fn chars(&self) -> &[char] {
		&self.chars
	}

	/// Length of the corpus in characters.
	pub fn len(&self) -> usize {
		self.chars.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chars.is_empty()
	}

	/// Returns the `maxlen` characters starting at `offset`.
	///
	/// Returns `None` when the window runs past the end of the corpus.
	pub fn window(&self, offset: usize, maxlen: usize) -> Option<String> {
		let end = offset.checked_add(maxlen)?;
		self.chars.get(offset..end).map(|window| window.iter().collect())
	}

	/// Returns `true` if `title` is one of the source records.
	///
	/// Comparison is case-insensitive.
	pub fn contains_record(&self, title: &str) -> bool {
		self.records.contains(&title.to_lowercase())
	}
}
