/// Form parameters of an inbound request, grouped by name in the order the
/// names were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    entries: Vec<(String, Vec<String>)>,
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, grouping it with earlier values for the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Replace every value for `name` with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, vec![value.into()]));
    }

    /// The first value for `name`, or an empty string when absent
    pub fn get(&self, name: &str) -> &str {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut form = FormValues::new();
        for (k, v) in iter {
            form.append(k, v);
        }
        form
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_grouping_keeps_first_seen_order() {
        let form: FormValues = [("b", "1"), ("a", "2"), ("b", "3")].into_iter().collect();
        let names: Vec<_> = form.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(form.get("b"), "1");
        assert_eq!(form.iter().next().unwrap().1.len(), 2);
        assert_eq!(form.get("missing"), "");
    }

    #[test]
    fn test_set_replaces() {
        let mut form: FormValues = [("a", "1"), ("a", "2")].into_iter().collect();
        form.set("a", "3");
        assert_eq!(form.get("a"), "3");
        assert_eq!(form.iter().count(), 1);
    }
}
