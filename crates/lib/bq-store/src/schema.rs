pub const TOOL_HEALTH: &str = "health";
pub const TOOL_LIST_DATASETS: &str = "list_datasets";
pub const TOOL_LIST_TABLES: &str = "list_tables";
pub const TOOL_DESCRIBE_TABLE: &str = "describe_table";
pub const TOOL_EXECUTE_QUERY: &str = "execute_query";

/// Query issued by smoke tests to confirm the warehouse answers.
pub const SMOKE_TEST_QUERY: &str = "SELECT 1 as test";

pub const TABLE_NAME_SEPARATOR: char = '.';

pub fn make_table_name(dataset_id: &str, table_id: &str) -> String {
    format!("{dataset_id}{TABLE_NAME_SEPARATOR}{table_id}")
}

/// Splits `dataset.table` into its parts.
///
/// A leading `project.` segment is tolerated and dropped, so
/// `project.dataset.table` resolves to the same pair. Returns `None` when
/// any part is empty, the name has no separator, or it has more than three
/// segments.
pub fn split_table_name(name: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = name.trim().split(TABLE_NAME_SEPARATOR).collect();
    let (dataset_id, table_id) = match parts.as_slice() {
        [dataset_id, table_id] => (*dataset_id, *table_id),
        [project, dataset_id, table_id] if !project.is_empty() => (*dataset_id, *table_id),
        _ => return None,
    };
    if dataset_id.is_empty() || table_id.is_empty() {
        return None;
    }
    Some((dataset_id, table_id))
}
