/// Prefix given to inline children declared without a name
pub const ANONYMOUS_PREFIX: &str = "anonymous_";
/// Name segment that marks an input resource (`dashboard.x.input.<short>`)
pub const INPUT_SEGMENT: &str = "input";
/// Column a control's query must return for every row
pub const CONTROL_STATUS_COLUMN: &str = "status";
/// Separator used when a resource appears more than once in one tree
pub const DUPLICATE_NAME_SEPARATOR: &str = "_";
