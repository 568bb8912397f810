use std::collections::BTreeMap;
use std::fmt;

use fieldops_interchange::{to_camel_case, to_snake_case, ResourceKind, Scope};
use fieldops_transport::ApiRequest;

/// Named filter values. Absent filters match everything.
///
/// Names are normalized to snake_case; blank values and the value `all`
/// are treated as absent, so "status: all" and no status filter produce
/// the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: &str) {
        let name = to_snake_case(name.trim());
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            self.0.remove(&name);
        } else {
            self.0.insert(name, value.to_string());
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.remove(&to_snake_case(name.trim()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn search(&self) -> Option<&str> {
        self.get("search")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `name=value` pairs.
    pub fn parse_pairs<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        let mut filters = Filters::new();
        for pair in pairs {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("invalid filter '{}': expected name=value", pair))?;
            if name.trim().is_empty() {
                return Err(format!("invalid filter '{}': empty name", pair));
            }
            filters.set(name, value);
        }
        Ok(filters)
    }
}

impl fmt::Display for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&parts.join("&"))
    }
}

/// Identity of one cached collection: (resource, scope, filters).
///
/// Equal keys are cache-equivalent; any filter change is a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub resource: ResourceKind,
    pub scope: Scope,
    pub filters: Filters,
}

impl QueryKey {
    pub fn new(resource: ResourceKind, scope: Scope, filters: Filters) -> Self {
        QueryKey {
            resource,
            scope,
            filters,
        }
    }

    /// The list request for this key, or `None` when the resource cannot
    /// be listed in this scope. Only filters the server understands are
    /// sent, with camelCase names.
    pub fn request(&self) -> Option<ApiRequest> {
        let spec = self.resource.spec();
        let path = spec.list_path(self.scope)?;
        let mut request = ApiRequest::get(path);
        for (name, value) in self.filters.iter() {
            if spec.is_server_filter(name) {
                request = request.with_query(to_camel_case(name), value);
            }
        }
        Some(request)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource, self.scope)?;
        if !self.filters.is_empty() {
            write!(f, "?{}", self.filters)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_change_changes_key() {
        let pending = QueryKey::new(
            ResourceKind::Tasks,
            Scope::All,
            Filters::new().with("status", "pending"),
        );
        let completed = QueryKey::new(
            ResourceKind::Tasks,
            Scope::All,
            Filters::new().with("status", "completed"),
        );
        assert_ne!(pending, completed);
        let again = QueryKey::new(
            ResourceKind::Tasks,
            Scope::All,
            Filters::new().with("status", " pending "),
        );
        assert_eq!(pending, again);
    }

    #[test]
    fn all_and_blank_are_absent() {
        let f = Filters::new().with("status", "all").with("priority", "");
        assert!(f.is_empty());
        assert_eq!(f, Filters::new());
    }

    #[test]
    fn names_are_snake_cased() {
        let f = Filters::new().with("assignedTo", "7");
        assert_eq!(f.get("assigned_to"), Some("7"));
    }

    #[test]
    fn request_sends_only_server_filters() {
        let key = QueryKey::new(
            ResourceKind::Tasks,
            Scope::All,
            Filters::new().with("assigned_to", "7").with("issue_type", "fiber"),
        );
        let req = key.request().unwrap();
        assert_eq!(req.target(), "/api/tasks?assignedTo=7");

        let cctv = QueryKey::new(
            ResourceKind::CctvRecords,
            Scope::Customer(3),
            Filters::new().with("search", "cam"),
        );
        assert_eq!(
            cctv.request().unwrap().target(),
            "/api/customers/3/cctv-information"
        );
    }

    #[test]
    fn unsupported_scope_has_no_request() {
        let key = QueryKey::new(ResourceKind::Customers, Scope::Mine, Filters::new());
        assert!(key.request().is_none());
    }

    #[test]
    fn parse_pairs() {
        let f = Filters::parse_pairs(["status=pending", "priority=high"]).unwrap();
        assert_eq!(f.to_string(), "priority=high&status=pending");
        assert!(Filters::parse_pairs(["nonsense"]).is_err());
        assert!(Filters::parse_pairs(["=x"]).is_err());
    }

    #[test]
    fn key_display() {
        let key = QueryKey::new(
            ResourceKind::CctvRecords,
            Scope::Customer(4),
            Filters::new().with("search", "gate"),
        );
        assert_eq!(key.to_string(), "cctv[customer:4]?search=gate");
    }
}
