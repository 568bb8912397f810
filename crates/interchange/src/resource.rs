//! The resource route table.
//!
//! Every managed resource is described by one [`ResourceSpec`]: the paths
//! serving each [`Scope`], the operations it supports, the filters the
//! server applies, and the fields the client searches locally. The client
//! crate is generic over this table; adding a resource means adding a
//! variant and a table row, never a new code path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A resource managed by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Customers,
    Tasks,
    TaskHistory,
    TaskComments,
    CctvRecords,
    SystemDetails,
    Complaints,
    Documents,
    DailyReports,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Customers,
        ResourceKind::Tasks,
        ResourceKind::TaskHistory,
        ResourceKind::TaskComments,
        ResourceKind::CctvRecords,
        ResourceKind::SystemDetails,
        ResourceKind::Complaints,
        ResourceKind::Documents,
        ResourceKind::DailyReports,
    ];

    /// Stable name used in query keys, CLI arguments and log fields.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn spec(self) -> &'static ResourceSpec {
        match self {
            ResourceKind::Customers => &CUSTOMERS,
            ResourceKind::Tasks => &TASKS,
            ResourceKind::TaskHistory => &TASK_HISTORY,
            ResourceKind::TaskComments => &TASK_COMMENTS,
            ResourceKind::CctvRecords => &CCTV_RECORDS,
            ResourceKind::SystemDetails => &SYSTEM_DETAILS,
            ResourceKind::Complaints => &COMPLAINTS,
            ResourceKind::Documents => &DOCUMENTS,
            ResourceKind::DailyReports => &DAILY_REPORTS,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceKind::ALL
            .into_iter()
            .find(|k| {
                let spec = k.spec();
                spec.name == wanted || spec.aliases.contains(&wanted.as_str())
            })
            .ok_or_else(|| format!("unknown resource '{}'", s))
    }
}

/// Which slice of a resource a collection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Everything the session may see.
    All,
    /// Rows owned by the signed-in user (my tasks, my reports, my complaints).
    Mine,
    /// Rows belonging to one customer.
    Customer(i64),
    /// Rows belonging to one ticket (comments, history).
    Task(i64),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("all"),
            Scope::Mine => f.write_str("mine"),
            Scope::Customer(id) => write!(f, "customer:{}", id),
            Scope::Task(id) => write!(f, "task:{}", id),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    /// Parse `all`, `mine`, `customer:<id>` or `task:<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "all" | "" => return Ok(Scope::All),
            "mine" | "my" => return Ok(Scope::Mine),
            _ => {}
        }
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid scope '{}': expected all, mine, customer:<id> or task:<id>", s))?;
        let id: i64 = id
            .parse()
            .map_err(|_| format!("invalid scope '{}': '{}' is not an integer id", s, id))?;
        match kind {
            "customer" => Ok(Scope::Customer(id)),
            "task" => Ok(Scope::Task(id)),
            other => Err(format!("invalid scope kind '{}'", other)),
        }
    }
}

/// A client operation on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Verb used in user-facing failure messages ("failed to update task").
    pub fn verb(self) -> &'static str {
        match self {
            Operation::List => "load",
            Operation::Get => "load",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// HTTP method the API expects for updates of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMethod {
    Put,
    Patch,
}

/// Static description of one resource.
///
/// Path templates use `{id}`, `{customer}` and `{task}` placeholders.
#[derive(Debug)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: &'static str,
    /// Singular noun for messages ("failed to create CCTV record").
    pub label: &'static str,
    pub aliases: &'static [&'static str],
    pub list_all: Option<&'static str>,
    pub list_mine: Option<&'static str>,
    pub list_by_customer: Option<&'static str>,
    pub list_by_task: Option<&'static str>,
    /// Item path used for GET and DELETE.
    pub item: Option<&'static str>,
    pub get: bool,
    pub create: Option<&'static str>,
    pub update: Option<(UpdateMethod, &'static str)>,
    pub delete: bool,
    /// Filters the server applies itself (snake_case names).
    pub server_filters: &'static [&'static str],
    /// Fields searched client-side when the server has no `search` filter.
    pub search_fields: &'static [&'static str],
    /// Fields a create payload must carry.
    pub required_on_create: &'static [&'static str],
    /// Field naming the parent customer, for parent-scoped invalidation.
    pub customer_field: Option<&'static str>,
    /// Field naming the parent task, for task-scoped invalidation.
    pub task_field: Option<&'static str>,
    /// Human-facing sequence number suggested as `len + 1` before create.
    pub display_id_field: Option<&'static str>,
    /// Default columns when rendering a table.
    pub columns: &'static [&'static str],
}

impl ResourceSpec {
    pub fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::List => {
                self.list_all.is_some()
                    || self.list_mine.is_some()
                    || self.list_by_customer.is_some()
                    || self.list_by_task.is_some()
            }
            Operation::Get => self.get && self.item.is_some(),
            Operation::Create => self.create.is_some(),
            Operation::Update => self.update.is_some(),
            Operation::Delete => self.delete && self.item.is_some(),
        }
    }

    /// Scopes this resource can be listed under.
    pub fn supports_scope(&self, scope: Scope) -> bool {
        self.list_path(scope).is_some()
    }

    /// Collection path for a scope, or `None` when the API has no such list.
    pub fn list_path(&self, scope: Scope) -> Option<String> {
        match scope {
            Scope::All => self.list_all.map(str::to_string),
            Scope::Mine => self.list_mine.map(str::to_string),
            Scope::Customer(c) => self
                .list_by_customer
                .map(|t| t.replace("{customer}", &c.to_string())),
            Scope::Task(t) => self
                .list_by_task
                .map(|p| p.replace("{task}", &t.to_string())),
        }
    }

    pub fn item_path(&self, id: i64) -> Option<String> {
        self.item.map(|t| t.replace("{id}", &id.to_string()))
    }

    pub fn update_route(&self, id: i64) -> Option<(UpdateMethod, String)> {
        self.update
            .map(|(method, t)| (method, t.replace("{id}", &id.to_string())))
    }

    pub fn is_server_filter(&self, name: &str) -> bool {
        self.server_filters.contains(&name)
    }
}

// ── Route table ─────────────────────────────────────────────────────

static CUSTOMERS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Customers,
    name: "customers",
    label: "customer",
    aliases: &["customer"],
    list_all: Some("/api/customers"),
    list_mine: None,
    list_by_customer: None,
    list_by_task: None,
    item: Some("/api/customers/{id}"),
    get: true,
    create: Some("/api/customers"),
    update: Some((UpdateMethod::Put, "/api/customers/{id}")),
    delete: true,
    server_filters: &["search", "location"],
    search_fields: &["customer_id", "name", "contact_person", "email", "city"],
    required_on_create: &["name"],
    customer_field: Some("id"),
    task_field: None,
    display_id_field: None,
    columns: &["id", "customer_id", "name", "city", "service_plan", "status"],
};

static TASKS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Tasks,
    name: "tasks",
    label: "task",
    aliases: &["task", "tickets", "ticket"],
    list_all: Some("/api/tasks"),
    list_mine: Some("/api/tasks/my-tasks"),
    list_by_customer: Some("/api/customers/{customer}/tasks"),
    list_by_task: None,
    item: Some("/api/tasks/{id}"),
    get: true,
    create: Some("/api/tasks"),
    update: Some((UpdateMethod::Put, "/api/tasks/{id}")),
    delete: true,
    server_filters: &["search", "status", "priority", "assigned_to"],
    search_fields: &["ticket_number", "title", "description", "customer_name"],
    required_on_create: &["title"],
    customer_field: Some("customer_id"),
    task_field: Some("id"),
    display_id_field: Some("ticket_number"),
    columns: &["id", "ticket_number", "title", "priority", "status", "customer_name"],
};

static TASK_HISTORY: ResourceSpec = ResourceSpec {
    kind: ResourceKind::TaskHistory,
    name: "task_history",
    label: "task history entry",
    aliases: &["history"],
    list_all: None,
    list_mine: None,
    list_by_customer: None,
    list_by_task: Some("/api/tasks/{task}/history"),
    item: None,
    get: false,
    create: None,
    update: None,
    delete: false,
    server_filters: &[],
    search_fields: &["message", "created_by_name"],
    required_on_create: &[],
    customer_field: None,
    task_field: Some("task_id"),
    display_id_field: None,
    columns: &["id", "type", "status", "message", "created_by_name", "created_at"],
};

static TASK_COMMENTS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::TaskComments,
    name: "task_comments",
    label: "comment",
    aliases: &["comments", "comment"],
    list_all: None,
    list_mine: None,
    list_by_customer: None,
    list_by_task: Some("/api/tasks/{task}/comments"),
    item: None,
    get: false,
    create: Some("/api/customer/comments"),
    update: None,
    delete: false,
    server_filters: &[],
    search_fields: &["comment", "created_by_name"],
    required_on_create: &["task_id", "comment"],
    customer_field: None,
    task_field: Some("task_id"),
    display_id_field: None,
    columns: &["id", "comment", "created_by_name", "created_at"],
};

static CCTV_RECORDS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::CctvRecords,
    name: "cctv",
    label: "CCTV record",
    aliases: &["cctv_records", "cctv_information"],
    list_all: Some("/api/customer-portal/cctv-information"),
    list_mine: None,
    list_by_customer: Some("/api/customers/{customer}/cctv-information"),
    list_by_task: None,
    item: Some("/api/customer-portal/cctv-information/{id}"),
    get: true,
    create: Some("/api/customer-portal/cctv-information"),
    update: Some((UpdateMethod::Put, "/api/customer-portal/cctv-information/{id}")),
    delete: true,
    server_filters: &[],
    search_fields: &[
        "serial_number",
        "camera_ip",
        "model_no",
        "location_name",
        "device_serial_no",
        "mac_address",
    ],
    required_on_create: &[],
    customer_field: Some("customer_id"),
    task_field: None,
    display_id_field: Some("serial_number"),
    columns: &["id", "serial_number", "camera_ip", "model_no", "location_name", "uplink"],
};

static SYSTEM_DETAILS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::SystemDetails,
    name: "system_details",
    label: "system detail",
    aliases: &["systems", "system"],
    list_all: Some("/api/customer-portal/system-details"),
    list_mine: None,
    list_by_customer: Some("/api/customers/{customer}/system-details"),
    list_by_task: None,
    item: Some("/api/customer-portal/system-details/{id}"),
    get: false,
    create: Some("/api/customer-portal/system-details"),
    update: Some((UpdateMethod::Put, "/api/customer-portal/system-details/{id}")),
    delete: true,
    server_filters: &[],
    search_fields: &["system_name", "emp_name", "emp_id", "ip_address", "department"],
    required_on_create: &["system_name"],
    customer_field: Some("customer_id"),
    task_field: None,
    display_id_field: None,
    columns: &["id", "system_name", "emp_name", "department", "ip_address"],
};

static COMPLAINTS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Complaints,
    name: "complaints",
    label: "complaint",
    aliases: &["complaint"],
    list_all: Some("/api/complaints"),
    list_mine: Some("/api/complaints/my"),
    list_by_customer: None,
    list_by_task: None,
    item: None,
    get: false,
    create: Some("/api/complaints"),
    update: Some((UpdateMethod::Put, "/api/complaints/{id}/status")),
    delete: false,
    server_filters: &[],
    search_fields: &["complaint_id", "subject", "description", "engineer_name"],
    required_on_create: &["subject", "description"],
    customer_field: None,
    task_field: None,
    display_id_field: None,
    columns: &["id", "complaint_id", "subject", "category", "status", "engineer_name"],
};

static DOCUMENTS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Documents,
    name: "documents",
    label: "document",
    aliases: &["document", "customer_documents"],
    list_all: Some("/api/portal/customer-documents"),
    list_mine: None,
    list_by_customer: None,
    list_by_task: None,
    item: Some("/api/portal/customer-documents/{id}"),
    get: false,
    create: Some("/api/portal/customer-documents"),
    update: None,
    delete: true,
    server_filters: &["search"],
    search_fields: &["customer_name", "document_name", "document_type"],
    required_on_create: &["customer_id", "document_type", "file_url"],
    customer_field: Some("customer_id"),
    task_field: None,
    display_id_field: None,
    columns: &["id", "customer_name", "document_type", "document_name", "file_url"],
};

static DAILY_REPORTS: ResourceSpec = ResourceSpec {
    kind: ResourceKind::DailyReports,
    name: "daily_reports",
    label: "daily report",
    aliases: &["reports", "daily_report"],
    list_all: Some("/api/daily-reports"),
    list_mine: Some("/api/daily-reports/my-reports"),
    list_by_customer: None,
    list_by_task: None,
    item: None,
    get: false,
    create: Some("/api/daily-reports"),
    update: None,
    delete: false,
    server_filters: &[],
    search_fields: &["engineer_name", "work_done", "issue_details"],
    required_on_create: &["sites_visited", "work_done", "sites_completed"],
    customer_field: None,
    task_field: None,
    display_id_field: None,
    columns: &["id", "engineer_name", "sites_visited", "sites_completed", "has_issue", "created_at"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_maps_to_its_own_spec() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.spec().kind, kind);
        }
    }

    #[test]
    fn parse_resource_names_and_aliases() {
        assert_eq!("tasks".parse::<ResourceKind>(), Ok(ResourceKind::Tasks));
        assert_eq!("ticket".parse::<ResourceKind>(), Ok(ResourceKind::Tasks));
        assert_eq!("cctv".parse::<ResourceKind>(), Ok(ResourceKind::CctvRecords));
        assert_eq!(
            "system-details".parse::<ResourceKind>(),
            Ok(ResourceKind::SystemDetails)
        );
        assert!("widgets".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn parse_scopes() {
        assert_eq!("all".parse::<Scope>(), Ok(Scope::All));
        assert_eq!("mine".parse::<Scope>(), Ok(Scope::Mine));
        assert_eq!("customer:12".parse::<Scope>(), Ok(Scope::Customer(12)));
        assert_eq!("task:3".parse::<Scope>(), Ok(Scope::Task(3)));
        assert!("customer:x".parse::<Scope>().is_err());
        assert!("region:1".parse::<Scope>().is_err());
        assert_eq!(Scope::Customer(12).to_string(), "customer:12");
    }

    #[test]
    fn scoped_paths() {
        let cctv = ResourceKind::CctvRecords.spec();
        assert_eq!(
            cctv.list_path(Scope::All).as_deref(),
            Some("/api/customer-portal/cctv-information")
        );
        assert_eq!(
            cctv.list_path(Scope::Customer(5)).as_deref(),
            Some("/api/customers/5/cctv-information")
        );
        assert_eq!(cctv.list_path(Scope::Mine), None);

        let history = ResourceKind::TaskHistory.spec();
        assert_eq!(
            history.list_path(Scope::Task(9)).as_deref(),
            Some("/api/tasks/9/history")
        );
        assert!(!history.supports_scope(Scope::All));
    }

    #[test]
    fn complaint_updates_go_to_status_route() {
        let spec = ResourceKind::Complaints.spec();
        let (method, path) = spec.update_route(4).unwrap();
        assert_eq!(method, UpdateMethod::Put);
        assert_eq!(path, "/api/complaints/4/status");
        assert!(!spec.supports(Operation::Delete));
    }

    #[test]
    fn operation_support() {
        assert!(ResourceKind::Customers.spec().supports(Operation::Delete));
        assert!(!ResourceKind::DailyReports.spec().supports(Operation::Update));
        assert!(!ResourceKind::TaskHistory.spec().supports(Operation::Create));
        assert!(ResourceKind::TaskComments.spec().supports(Operation::Create));
        assert!(ResourceKind::Documents.spec().supports(Operation::Delete));
        assert!(!ResourceKind::Documents.spec().supports(Operation::Get));
    }
}
