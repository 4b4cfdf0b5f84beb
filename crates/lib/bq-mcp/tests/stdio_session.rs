use bq_core::control::WarehouseControlPlane;
use bq_core::warehouse::MemoryWarehouse;
use bq_mcp::client::{ClientError, McpClient, render_tool_result};
use bq_mcp::server::serve_io;
use bq_store::models::{FieldMode, FieldSchema, QueryResult, TableSchema};
use bq_store::schema::{
    SMOKE_TEST_QUERY,
    TOOL_DESCRIBE_TABLE,
    TOOL_EXECUTE_QUERY,
    TOOL_HEALTH,
    TOOL_LIST_DATASETS,
    TOOL_LIST_TABLES,
};
use serde_json::{Map, Value, json};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

type TestClient = McpClient<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn warehouse() -> MemoryWarehouse {
    let mut row = Map::new();
    row.insert("test".to_string(), json!(1));
    MemoryWarehouse::new("acme")
        .with_dataset("staging")
        .with_table(TableSchema::new(
            "sales",
            "orders",
            vec![
                FieldSchema::new("id", "INTEGER").with_mode(FieldMode::Required),
                FieldSchema::new("total", "NUMERIC").with_description("order total"),
            ],
        ))
        .with_table(TableSchema::new("sales", "customers", Vec::new()))
        .with_query_result(
            SMOKE_TEST_QUERY,
            QueryResult::new(vec![FieldSchema::new("test", "INTEGER")], vec![row]),
        )
}

async fn start_session(
    control: WarehouseControlPlane<MemoryWarehouse>,
) -> (TestClient, JoinHandle<()>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let server = tokio::spawn(async move {
        let _ = serve_io(control, server_read, server_write).await;
    });

    let (client_read, client_write) = tokio::io::split(client_io);
    let mut client = McpClient::new(client_read, client_write).with_client_info("session-test", "0.0.0");
    let init = client.connect().await.expect("handshake");
    assert!(!init.server_info.name.is_empty());
    assert!(!init.protocol_version.is_empty());
    assert!(
        init.instructions
            .as_deref()
            .is_some_and(|text| text.contains("list_tables"))
    );
    (client, server)
}

async fn call_json(client: &mut TestClient, tool: &str, arguments: Value) -> Value {
    let result = client.call_tool(tool, arguments).await.expect("tool call");
    assert!(!result.is_error(), "tool {tool} reported an error");
    let text = result.first_text().expect("text content");
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[tokio::test]
async fn lists_every_tool() {
    let (mut client, server) = start_session(WarehouseControlPlane::new(warehouse())).await;
    let tools = client.list_tools().await.expect("tools");
    let mut names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec![
            TOOL_DESCRIBE_TABLE,
            TOOL_EXECUTE_QUERY,
            TOOL_HEALTH,
            TOOL_LIST_DATASETS,
            TOOL_LIST_TABLES,
        ]
    );
    let describe = tools
        .iter()
        .find(|tool| tool.name == TOOL_DESCRIBE_TABLE)
        .expect("describe_table");
    assert!(describe.input_schema["properties"].get("table_name").is_some());

    drop(client);
    let _ = server.await;
}

#[tokio::test]
async fn catalog_tools_return_json() {
    let (mut client, server) = start_session(WarehouseControlPlane::new(warehouse())).await;

    let health = client
        .call_tool(TOOL_HEALTH, json!({}))
        .await
        .expect("health");
    assert_eq!(render_tool_result(&health), "ok");

    assert_eq!(
        call_json(&mut client, TOOL_LIST_DATASETS, json!({})).await,
        json!(["sales", "staging"])
    );
    assert_eq!(
        call_json(&mut client, TOOL_LIST_TABLES, json!({ "dataset_id": "sales" })).await,
        json!(["customers", "orders"])
    );
    assert_eq!(
        call_json(&mut client, TOOL_LIST_TABLES, json!({})).await,
        json!(["sales.customers", "sales.orders"])
    );

    let fields = call_json(
        &mut client,
        TOOL_DESCRIBE_TABLE,
        json!({ "table_name": "sales.orders" }),
    )
    .await;
    assert_eq!(fields[0]["name"], "id");
    assert_eq!(fields[0]["mode"], "REQUIRED");
    assert_eq!(fields[1]["type"], "NUMERIC");
    assert_eq!(fields[1]["description"], "order total");

    let same = call_json(
        &mut client,
        TOOL_DESCRIBE_TABLE,
        json!({ "dataset_id": "sales", "table_id": "orders" }),
    )
    .await;
    assert_eq!(same, fields);

    drop(client);
    let _ = server.await;
}

#[tokio::test]
async fn execute_query_returns_rows() {
    let (mut client, server) = start_session(WarehouseControlPlane::new(warehouse())).await;
    let rows = call_json(
        &mut client,
        TOOL_EXECUTE_QUERY,
        json!({ "query": SMOKE_TEST_QUERY }),
    )
    .await;
    assert_eq!(rows, json!([{ "test": 1 }]));

    drop(client);
    let _ = server.await;
}

#[tokio::test]
async fn failures_map_to_error_codes() {
    let (mut client, server) = start_session(WarehouseControlPlane::new(warehouse())).await;

    let missing = client
        .call_tool(TOOL_DESCRIBE_TABLE, json!({ "table_name": "sales.nope" }))
        .await
        .expect_err("missing table");
    assert!(matches!(missing, ClientError::Rpc { code: -32002, .. }));

    let incomplete = client
        .call_tool(TOOL_DESCRIBE_TABLE, json!({ "dataset_id": "sales" }))
        .await
        .expect_err("incomplete target");
    assert!(matches!(incomplete, ClientError::Rpc { code: -32602, .. }));

    let blank = client
        .call_tool(TOOL_EXECUTE_QUERY, json!({ "query": "  " }))
        .await
        .expect_err("blank query");
    assert!(matches!(blank, ClientError::Rpc { code: -32602, .. }));

    let unknown_query = client
        .call_tool(TOOL_EXECUTE_QUERY, json!({ "query": "SELECT 2" }))
        .await
        .expect_err("unregistered query");
    assert!(matches!(unknown_query, ClientError::Rpc { code: -32002, .. }));

    drop(client);
    let _ = server.await;
}

#[tokio::test]
async fn dataset_filter_applies_to_unscoped_listing() {
    let control =
        WarehouseControlPlane::new(warehouse()).with_dataset_filter(Some("staging".to_string()));
    let (mut client, server) = start_session(control).await;

    assert_eq!(
        call_json(&mut client, TOOL_LIST_DATASETS, json!({})).await,
        json!(["staging"])
    );
    assert_eq!(
        call_json(&mut client, TOOL_LIST_TABLES, json!({})).await,
        json!([])
    );

    drop(client);
    let _ = server.await;
}
