//! DynamoDB store backend.
//!
//! Implements the [`Store`] trait over a single DynamoDB table whose key
//! schema is the `$p`/`$s` attribute pair. Write conditions compile to
//! condition expressions, the prefix-range query to a `begins_with` key
//! condition, and atomic batches to `TransactWriteItems`.

mod conversions;
mod error;

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{
    AttributeValue, ConditionCheck, Delete, Put, TransactWriteItem, Update,
};
use aws_sdk_dynamodb::Client;

use artsync_core::error::{Error, Result};
use artsync_core::item::{Document, ItemKey, StoredItem};
use artsync_core::ops::{WriteCondition, WritePrimitive};
use artsync_core::page::ContinuationKey;
use artsync_core::store::{Store, StorePage};

use conversions::{attributes_to_item, item_to_attributes, value_to_attribute};
use error::{
    map_delete_item_error, map_get_item_error, map_put_item_error, map_query_error,
    map_transact_error, map_update_item_error,
};

/// DynamoDB-backed store.
pub struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    /// Creates a store with the given DynamoDB client and table name.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Creates a store from environment configuration.
    ///
    /// Uses the AWS SDK default credential chain and reads the table name
    /// from `DYNAMODB_TABLE_NAME` (defaults to "artsync").
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        let table_name =
            std::env::var("DYNAMODB_TABLE_NAME").unwrap_or_else(|_| "artsync".to_string());

        Ok(Self::new(client, table_name))
    }

    /// Get the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

/// A compiled condition expression with its attribute name/value
/// placeholders.
struct ConditionExpr {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

fn condition_expr(condition: &WriteCondition) -> ConditionExpr {
    match condition {
        WriteCondition::NotExists => ConditionExpr {
            expression: "attribute_not_exists(#p)".to_string(),
            names: HashMap::from([("#p".to_string(), "$p".to_string())]),
            values: HashMap::new(),
        },
        WriteCondition::VersionEquals(version) => ConditionExpr {
            expression: "#v = :v".to_string(),
            names: HashMap::from([("#v".to_string(), "$v".to_string())]),
            values: HashMap::from([(":v".to_string(), AttributeValue::N(version.to_string()))]),
        },
    }
}

/// Compiles a set-attributes map into a `SET` update expression.
fn update_expr(set: &Document) -> Result<ConditionExpr> {
    if set.is_empty() {
        return Err(Error::Serialization(
            "update requires at least one attribute to set".to_string(),
        ));
    }
    let mut clauses = Vec::with_capacity(set.len());
    let mut names = HashMap::new();
    let mut values = HashMap::new();
    for (i, (name, value)) in set.iter().enumerate() {
        let name_placeholder = format!("#u{i}");
        let value_placeholder = format!(":u{i}");
        clauses.push(format!("{name_placeholder} = {value_placeholder}"));
        names.insert(name_placeholder, name.clone());
        values.insert(value_placeholder, value_to_attribute(value)?);
    }
    Ok(ConditionExpr {
        expression: format!("SET {}", clauses.join(", ")),
        names,
        values,
    })
}

fn key_attributes(key: &ItemKey) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("$p".to_string(), AttributeValue::S(key.partition_key.clone())),
        ("$s".to_string(), AttributeValue::S(key.sort_key.clone())),
    ])
}

fn continuation_attributes(key: &ContinuationKey) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("$p".to_string(), AttributeValue::S(key.partition_key.clone())),
        ("$s".to_string(), AttributeValue::S(key.sort_key.clone())),
    ])
}

fn continuation_from_attributes(
    attributes: &HashMap<String, AttributeValue>,
) -> Result<ContinuationKey> {
    let string_attribute = |name: &str| {
        attributes
            .get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .ok_or_else(|| {
                Error::Serialization(format!("continuation key is missing attribute {name}"))
            })
    };
    Ok(ContinuationKey {
        partition_key: string_attribute("$p")?,
        sort_key: string_attribute("$s")?,
    })
}

fn build_error(err: impl std::fmt::Debug) -> Error {
    Error::StoreUnavailable(format!("invalid transact item: {err:?}"))
}

fn non_empty(
    values: HashMap<String, AttributeValue>,
) -> Option<HashMap<String, AttributeValue>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

impl DynamoStore {
    fn transact_item(&self, primitive: WritePrimitive) -> Result<TransactWriteItem> {
        let item = match primitive {
            WritePrimitive::Put { item, condition } => {
                let mut builder = Put::builder()
                    .table_name(&self.table_name)
                    .set_item(Some(item_to_attributes(&item)?));
                if let Some(condition) = &condition {
                    let compiled = condition_expr(condition);
                    builder = builder
                        .condition_expression(compiled.expression)
                        .set_expression_attribute_names(Some(compiled.names))
                        .set_expression_attribute_values(non_empty(compiled.values));
                }
                TransactWriteItem::builder()
                    .put(builder.build().map_err(build_error)?)
                    .build()
            }
            WritePrimitive::Delete { key, condition } => {
                let mut builder = Delete::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(key_attributes(&key)));
                if let Some(condition) = &condition {
                    let compiled = condition_expr(condition);
                    builder = builder
                        .condition_expression(compiled.expression)
                        .set_expression_attribute_names(Some(compiled.names))
                        .set_expression_attribute_values(non_empty(compiled.values));
                }
                TransactWriteItem::builder()
                    .delete(builder.build().map_err(build_error)?)
                    .build()
            }
            WritePrimitive::Update {
                key,
                set,
                condition,
            } => {
                let compiled_update = update_expr(&set)?;
                let mut names = compiled_update.names;
                let mut values = compiled_update.values;
                let mut builder = Update::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(key_attributes(&key)))
                    .update_expression(compiled_update.expression);
                if let Some(condition) = &condition {
                    let compiled = condition_expr(condition);
                    builder = builder.condition_expression(compiled.expression);
                    names.extend(compiled.names);
                    values.extend(compiled.values);
                }
                builder = builder
                    .set_expression_attribute_names(Some(names))
                    .set_expression_attribute_values(non_empty(values));
                TransactWriteItem::builder()
                    .update(builder.build().map_err(build_error)?)
                    .build()
            }
            WritePrimitive::ConditionCheck { key, condition } => {
                let compiled = condition_expr(&condition);
                let check = ConditionCheck::builder()
                    .table_name(&self.table_name)
                    .set_key(Some(key_attributes(&key)))
                    .condition_expression(compiled.expression)
                    .set_expression_attribute_names(Some(compiled.names))
                    .set_expression_attribute_values(non_empty(compiled.values))
                    .build()
                    .map_err(build_error)?;
                TransactWriteItem::builder().condition_check(check).build()
            }
        };
        Ok(item)
    }
}

#[async_trait]
impl Store for DynamoStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<StoredItem>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(key)))
            .send()
            .await
            .map_err(map_get_item_error)?;

        match result.item {
            Some(attributes) => Ok(Some(attributes_to_item(&attributes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, item: StoredItem, condition: Option<WriteCondition>) -> Result<()> {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_to_attributes(&item)?));
        if let Some(condition) = &condition {
            let compiled = condition_expr(condition);
            request = request
                .condition_expression(compiled.expression)
                .set_expression_attribute_names(Some(compiled.names))
                .set_expression_attribute_values(non_empty(compiled.values));
        }
        request.send().await.map_err(map_put_item_error)?;

        Ok(())
    }

    async fn delete(&self, key: &ItemKey, condition: Option<WriteCondition>) -> Result<()> {
        let mut request = self
            .client
            .delete_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(key)));
        if let Some(condition) = &condition {
            let compiled = condition_expr(condition);
            request = request
                .condition_expression(compiled.expression)
                .set_expression_attribute_names(Some(compiled.names))
                .set_expression_attribute_values(non_empty(compiled.values));
        }
        request.send().await.map_err(map_delete_item_error)?;

        Ok(())
    }

    async fn update(
        &self,
        key: &ItemKey,
        set: Document,
        condition: Option<WriteCondition>,
    ) -> Result<()> {
        let compiled_update = update_expr(&set)?;
        let mut names = compiled_update.names;
        let mut values = compiled_update.values;
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key_attributes(key)))
            .update_expression(compiled_update.expression);
        if let Some(condition) = &condition {
            let compiled = condition_expr(condition);
            request = request.condition_expression(compiled.expression);
            names.extend(compiled.names);
            values.extend(compiled.values);
        }
        request
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(non_empty(values))
            .send()
            .await
            .map_err(map_update_item_error)?;

        Ok(())
    }

    async fn query(
        &self,
        partition_key: &str,
        sort_key_prefix: &str,
        start_after: Option<&ContinuationKey>,
        limit: Option<u32>,
    ) -> Result<StorePage> {
        let mut request = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("#p = :p AND begins_with(#s, :s)")
            .expression_attribute_names("#p", "$p")
            .expression_attribute_names("#s", "$s")
            .expression_attribute_values(":p", AttributeValue::S(partition_key.to_string()))
            .expression_attribute_values(":s", AttributeValue::S(sort_key_prefix.to_string()));
        if let Some(key) = start_after {
            request = request.set_exclusive_start_key(Some(continuation_attributes(key)));
        }
        if let Some(limit) = limit {
            request = request.limit(limit.max(1) as i32);
        }
        let result = request.send().await.map_err(map_query_error)?;

        let items = result
            .items
            .unwrap_or_default()
            .iter()
            .map(attributes_to_item)
            .collect::<Result<_>>()?;
        let last_key = result
            .last_evaluated_key
            .as_ref()
            .map(continuation_from_attributes)
            .transpose()?;

        Ok(StorePage { items, last_key })
    }

    async fn transact_write(&self, primitives: Vec<WritePrimitive>) -> Result<()> {
        let items = primitives
            .into_iter()
            .map(|primitive| self.transact_item(primitive))
            .collect::<Result<Vec<_>>>()?;
        self.client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(map_transact_error)?;

        Ok(())
    }
}
