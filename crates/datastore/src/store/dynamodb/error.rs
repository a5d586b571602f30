//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to the data-layer [`Error`] taxonomy. A refused
//! condition becomes [`Error::ConditionFailed`]; for a canceled transaction
//! the position of the failing primitive is recovered from the cancellation
//! reasons. Everything else is a pass-through [`Error::StoreUnavailable`].

use std::fmt::Debug;

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;

use artsync_core::error::Error;

/// Map a GetItem SDK error.
pub fn map_get_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<GetItemError, R>,
) -> Error {
    Error::StoreUnavailable(format!("GetItem failed: {:?}", err.into_service_error()))
}

/// Map a Query SDK error.
pub fn map_query_error<R: Debug + Send + Sync + 'static>(err: SdkError<QueryError, R>) -> Error {
    Error::StoreUnavailable(format!("Query failed: {:?}", err.into_service_error()))
}

/// Map a PutItem SDK error.
pub fn map_put_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<PutItemError, R>,
) -> Error {
    match err.into_service_error() {
        PutItemError::ConditionalCheckFailedException(_) => {
            Error::ConditionFailed { index: None }
        }
        err => Error::StoreUnavailable(format!("PutItem failed: {err:?}")),
    }
}

/// Map a DeleteItem SDK error.
pub fn map_delete_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DeleteItemError, R>,
) -> Error {
    match err.into_service_error() {
        DeleteItemError::ConditionalCheckFailedException(_) => {
            Error::ConditionFailed { index: None }
        }
        err => Error::StoreUnavailable(format!("DeleteItem failed: {err:?}")),
    }
}

/// Map an UpdateItem SDK error.
pub fn map_update_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<UpdateItemError, R>,
) -> Error {
    match err.into_service_error() {
        UpdateItemError::ConditionalCheckFailedException(_) => {
            Error::ConditionFailed { index: None }
        }
        err => Error::StoreUnavailable(format!("UpdateItem failed: {err:?}")),
    }
}

/// Map a TransactWriteItems SDK error, recovering the failing primitive's
/// position from the cancellation reasons when a condition was refused.
pub fn map_transact_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<TransactWriteItemsError, R>,
) -> Error {
    match err.into_service_error() {
        TransactWriteItemsError::TransactionCanceledException(canceled) => {
            let failed_index = canceled
                .cancellation_reasons()
                .iter()
                .position(|reason| reason.code() == Some("ConditionalCheckFailed"));
            match failed_index {
                Some(index) => Error::ConditionFailed { index: Some(index) },
                None => Error::StoreUnavailable(format!(
                    "Transaction canceled: {:?}",
                    canceled.cancellation_reasons()
                )),
            }
        }
        err => Error::StoreUnavailable(format!("TransactWriteItems failed: {err:?}")),
    }
}
