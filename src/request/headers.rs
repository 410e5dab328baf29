/// Ordered request headers with unique names.
///
/// Names compare ASCII-case-insensitively. Inserting an existing name keeps
/// its original position but takes the new spelling and value, so the last
/// writer wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Retrieves a header value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `self` followed by `later`, entries of `later` overriding
    /// entries of `self` with the same name.
    pub fn merged(&self, later: &Headers) -> Headers {
        let mut merged = self.clone();
        for (name, value) in later.iter() {
            merged.insert(name, value);
        }
        merged
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_case_insensitively_in_place() {
        let mut headers = Headers::new();
        headers.insert("Accept", "*/*");
        headers.insert("User-Agent", "a");
        headers.insert("accept", "text/html");

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("accept", "text/html"), ("User-Agent", "a")]);
        assert_eq!(headers.get("ACCEPT"), Some("text/html"));
    }

    #[test]
    fn merged_lets_later_map_win() {
        let base: Headers = [("Cookie", "a=1"), ("X-Trace", "base")].into_iter().collect();
        let extra: Headers = [("X-Trace", "extra"), ("Range", "bytes=0-")].into_iter().collect();

        let merged = base.merged(&extra);
        let pairs: Vec<_> = merged.iter().collect();
        assert_eq!(
            pairs,
            vec![("Cookie", "a=1"), ("X-Trace", "extra"), ("Range", "bytes=0-")]
        );
        assert_eq!(base.len(), 2);
    }
}
