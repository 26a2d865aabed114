use indexmap::IndexMap;

use crate::Error;

/// The maximum length of a table key, imposed by the one-byte length prefix
/// used on the wire.
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// A value in the RNDC "table of named values" wire format.
///
/// [`Value`] is a recursive sum type: a table's values may themselves be
/// tables, and a list's elements may be any [`Value`], including further
/// tables or lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An arbitrary byte string.
    ///
    /// Integers that appear semantically in the protocol (versions, nonces,
    /// serials, timestamps) are carried as the decimal ASCII representation
    /// of the number, e.g. the integer `121` is the three bytes `b"121"`.
    Binary(Vec<u8>),

    /// An ordered mapping from short ASCII keys to [`Value`]s.
    Table(Table),

    /// An ordered sequence of [`Value`]s.
    ///
    /// Lists only ever appear as the result of decoding a wire message sent
    /// by some other implementation; this crate's encoder never emits them.
    /// Attempting to encode a [`Value::List`] returns
    /// [`Error::UnknownDataType`].
    List(Vec<Value>),
}

impl Value {
    /// Construct a [`Value::Binary`] from the decimal ASCII representation
    /// of `n`.
    pub fn from_int(n: u64) -> Self {
        Value::Binary(n.to_string().into_bytes())
    }

    /// Construct a [`Value::Binary`] from a UTF-8 string.
    pub fn from_str(s: impl AsRef<str>) -> Self {
        Value::Binary(s.as_ref().as_bytes().to_vec())
    }

    /// Returns this value's bytes, if it is a [`Value::Binary`].
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns this value interpreted as a UTF-8 string, if it is a
    /// [`Value::Binary`] containing valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns this value parsed as a decimal integer, if it is a
    /// [`Value::Binary`] containing an ASCII decimal number.
    pub fn as_int(&self) -> Option<u64> {
        self.as_str().and_then(|s| s.parse().ok())
    }

    /// Returns this value as a [`Table`], if it is a [`Value::Table`].
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Returns a short name for this value's variant, used in error
    /// messages.
    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            Value::Binary(_) => "Binary",
            Value::Table(_) => "Table",
            Value::List(_) => "List",
        }
    }
}

/// An ordered, duplicate-free mapping from short ASCII keys to [`Value`]s.
///
/// Insertion order is preserved and is significant: it is reproduced exactly
/// on the wire. Lookups are by key (unordered), but iteration always visits
/// entries in the order they were inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    entries: IndexMap<String, Value>,
}

impl Table {
    /// Construct a new, empty [`Table`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, overwriting (but preserving the original
    /// position of) any existing entry for that key.
    ///
    /// Returns the previous value, if one existed.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Insert `value` under `key`, returning [`Error::DuplicateKey`] if the
    /// key is already present.
    ///
    /// Used when parsing wire data, where the protocol requires keys to be
    /// unique within a table.
    pub(crate) fn insert_unique(&mut self, key: String, value: Value) -> Result<(), Error> {
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Returns the value associated with `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the sub-table associated with `key`, if any and if it is a
    /// [`Value::Table`].
    pub fn get_table(&self, key: &str) -> Option<&Table> {
        self.get(key).and_then(Value::as_table)
    }

    /// Returns a mutable reference to the sub-table stored at `key`,
    /// inserting a fresh, empty [`Table`] if the key is absent.
    ///
    /// Returns [`Error::BadArgumentType`] if `key` is already present but
    /// holds something other than a table.
    pub fn ensure_table_mut(&mut self, key: &str) -> Result<&mut Table, Error> {
        if !self.entries.contains_key(key) {
            self.entries.insert(key.to_owned(), Value::Table(Table::new()));
        }

        match self.entries.get_mut(key) {
            Some(Value::Table(t)) => Ok(t),
            Some(_) => Err(Error::BadArgumentType(format!(
                "{key} must be a table/hash"
            ))),
            None => unreachable!("just inserted"),
        }
    }

    /// Returns `true` if this table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries in this table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over the entries of this table, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = (&'a str, &'a Value);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Value)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl FromIterator<(String, Value)> for Table {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from_int_roundtrip() {
        let v = Value::from_int(121);
        assert_eq!(v.as_bytes(), Some(b"121".as_ref()));
        assert_eq!(v.as_int(), Some(121));
    }

    #[test]
    fn test_table_preserves_insertion_order() {
        let mut t = Table::new();
        t.insert("z", Value::from_int(1));
        t.insert("a", Value::from_int(2));
        t.insert("m", Value::from_int(3));

        let keys: Vec<_> = t.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_insert_unique_rejects_duplicate() {
        let mut t = Table::new();
        t.insert_unique("a".into(), Value::from_int(1)).unwrap();

        let err = t.insert_unique("a".into(), Value::from_int(2)).unwrap_err();
        assert_eq!(err, Error::DuplicateKey("a".into()));
    }

    #[test]
    fn test_ensure_table_mut_creates_empty() {
        let mut t = Table::new();
        let ctrl = t.ensure_table_mut("_ctrl").unwrap();
        assert!(ctrl.is_empty());
        assert_eq!(t.get_table("_ctrl"), Some(&Table::new()));
    }

    #[test]
    fn test_ensure_table_mut_rejects_non_table() {
        let mut t = Table::new();
        t.insert("_ctrl", Value::from_int(1));

        let err = t.ensure_table_mut("_ctrl").unwrap_err();
        assert!(matches!(err, Error::BadArgumentType(_)));
    }
}
