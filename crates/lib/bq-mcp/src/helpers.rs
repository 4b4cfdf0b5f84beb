use std::borrow::Cow;

use bq_core::control::ControlError;
use bq_core::warehouse::WarehouseError;
use rmcp::ErrorData;
use rmcp::model::ErrorCode;

pub(crate) fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

/// Maps control-plane failures onto MCP error codes.
#[must_use]
pub fn map_control_err(err: ControlError) -> ErrorData {
    let code = match &err {
        ControlError::InvalidInput(_) => ErrorCode::INVALID_PARAMS,
        ControlError::Warehouse(WarehouseError::NotFound(_)) => ErrorCode::RESOURCE_NOT_FOUND,
        ControlError::Warehouse(_) => ErrorCode::INTERNAL_ERROR,
    };
    mcp_err(code, err.to_string())
}
