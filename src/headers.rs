//! An ordered, case-insensitive header multimap.

/// One header field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
	/// The field name, exactly as supplied or received.
	pub name: String,

	/// The field value.
	pub value: Vec<u8>,
}

/// A collection of header fields.
///
/// Fields keep the order in which they were added, which is also the order in which they are
/// serialized. Lookups compare names ASCII-case-insensitively. A name may appear more than once.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderMap {
	fields: Vec<Field>,
}

impl HeaderMap {
	/// Constructs an empty map.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a field after all existing fields, keeping any existing fields with the same name.
	pub fn append(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
		self.fields.push(Field {
			name: name.into(),
			value: value.into(),
		});
	}

	/// Replaces all fields named `name` with a single field.
	///
	/// The new field takes the position of the first field it replaces, or goes at the end if there
	/// was none.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
		let name = name.into();
		let value = value.into();
		match self.position(&name) {
			Some(first) => {
				self.fields[first] = Field { name, value };
				let mut index = 0;
				let key = self.fields[first].name.clone();
				self.fields.retain(|f| {
					let keep = index <= first || !f.name.eq_ignore_ascii_case(&key);
					index += 1;
					keep
				});
			}
			None => self.fields.push(Field { name, value }),
		}
	}

	/// Removes all fields named `name`, returning whether any were present.
	pub fn remove(&mut self, name: &str) -> bool {
		let before = self.fields.len();
		self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
		self.fields.len() != before
	}

	/// Returns the value of the first field named `name`.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&[u8]> {
		self.position(name).map(|i| &self.fields[i].value[..])
	}

	/// Returns the value of the first field named `name` if it is valid UTF-8.
	#[must_use]
	pub fn get_str(&self, name: &str) -> Option<&str> {
		self.get(name).and_then(|v| std::str::from_utf8(v).ok())
	}

	/// Iterates over the values of every field named `name`, in order.
	pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
		self.fields
			.iter()
			.filter(move |f| f.name.eq_ignore_ascii_case(name))
			.map(|f| &f.value[..])
	}

	/// Returns whether at least one field is named `name`.
	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.position(name).is_some()
	}

	/// Iterates over all fields in order.
	pub fn iter(&self) -> std::slice::Iter<'_, Field> {
		self.fields.iter()
	}

	/// Returns the number of fields.
	#[must_use]
	pub fn len(&self) -> usize {
		self.fields.len()
	}

	/// Returns whether there are no fields.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	fn position(&self, name: &str) -> Option<usize> {
		self.fields
			.iter()
			.position(|f| f.name.eq_ignore_ascii_case(name))
	}
}

impl<'a> IntoIterator for &'a HeaderMap {
	type Item = &'a Field;
	type IntoIter = std::slice::Iter<'a, Field>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

impl<N: Into<String>, V: Into<Vec<u8>>> std::iter::FromIterator<(N, V)> for HeaderMap {
	fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
		let mut map = Self::new();
		for (name, value) in iter {
			map.append(name, value);
		}
		map
	}
}
