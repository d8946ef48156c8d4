//! Named async tools the assistant can call.
//!
//! Definitions are fixed once the registry is built; it is shared behind an
//! `Arc` for the lifetime of a session.

pub mod search;
pub mod user_info;

use crate::channel::BoxFuture;
use crate::protocol::models::Tool;
use crate::{Error, Result};
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub use search::{AzureSearchBackend, KeywordCatalog, SearchBackend, SearchRecord};
pub use user_info::{Clock, FixedClock, FixedRandom, RandomSource, SeededRandom, SystemClock, ThreadRandom, UserInfo};

pub const USER_INFORMATION: &str = "get_user_information";
pub const PRODUCT_INFORMATION: &str = "get_product_information";

/// Result returned to the model when string arguments are not valid JSON.
pub const ARGUMENT_DECODE_FAILURE: &str = "Erro ao processar a consulta.";

const PRODUCT_SEARCH_TOP: usize = 5;

pub type ToolFuture = BoxFuture<'static, Result<String>>;

type Executor = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
    executor: Executor,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Arguments shared by the built-in tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryArgs {
    /// The search query string
    pub query: String,
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    defs: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The two tools exposed to the voice assistant.
    #[must_use]
    pub fn standard(search: Arc<dyn SearchBackend>, user_info: UserInfo) -> Self {
        let mut registry = Self::new();

        let user_info = Arc::new(user_info);
        registry.register(
            USER_INFORMATION,
            "Search the knowledge base user credit card due date and amount",
            schemars::schema_for!(QueryArgs),
            move |_args: Value| {
                let user_info = Arc::clone(&user_info);
                async move { Ok(user_info.lookup()) }
            },
        );

        registry.tool(
            PRODUCT_INFORMATION,
            "Search the knowledge base for relevant product information.",
            move |args: QueryArgs| {
                let backend = Arc::clone(&search);
                async move {
                    let records = backend.search(&args.query, PRODUCT_SEARCH_TOP).await?;
                    Ok(search::format_results(&records))
                }
            },
        );

        registry
    }

    /// Register an executor taking raw JSON arguments. A later registration
    /// under the same name replaces the earlier one.
    pub fn register<F, Fut>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        schema: RootSchema,
        executor: F,
    ) where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let executor: Executor = Arc::new(move |args: Value| -> ToolFuture { Box::pin(executor(args)) });
        let def = ToolDefinition {
            name: name.to_string(),
            description: Some(description.into()),
            schema,
            executor,
        };

        if let Some(&slot) = self.index.get(name) {
            self.defs[slot] = def;
        } else {
            self.index.insert(name.to_string(), self.defs.len());
            self.defs.push(def);
        }
    }

    /// Register an executor with typed arguments; the schema is derived from `TArgs`.
    pub fn tool<TArgs, F, Fut>(&mut self, name: &str, description: impl Into<String>, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let schema = schemars::schema_for!(TArgs);
        let tool_name = name.to_string();
        let handler = Arc::new(handler);
        self.register(name, description, schema, move |value: Value| {
            let handler = Arc::clone(&handler);
            let tool_name = tool_name.clone();
            async move {
                let args: TArgs = serde_json::from_value(value)
                    .map_err(|e| Error::Execution(format!("Invalid arguments for {tool_name}: {e}")))?;
                handler(args).await
            }
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// # Errors
    /// Returns [`Error::UnknownFunction`] if nothing is registered under `name`.
    #[allow(clippy::result_large_err)]
    pub fn lookup(&self, name: &str) -> Result<&ToolDefinition> {
        self.index
            .get(name)
            .map(|&slot| &self.defs[slot])
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Run the named tool.
    ///
    /// String arguments are decoded as JSON first; if that fails the call
    /// yields [`ARGUMENT_DECODE_FAILURE`] rather than an error.
    ///
    /// # Errors
    /// Returns [`Error::UnknownFunction`] or whatever the executor fails with.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<String> {
        let def = self.lookup(name)?;
        let Some(arguments) = normalize_arguments(arguments) else {
            tracing::error!(function = name, "Failed to parse tool arguments");
            return Ok(ARGUMENT_DECODE_FAILURE.to_string());
        };
        (def.executor)(arguments).await
    }

    /// Protocol-level definitions for `session.update`.
    ///
    /// # Errors
    /// Returns an error if schema serialization fails.
    #[allow(clippy::result_large_err)]
    pub fn as_tools(&self) -> Result<Vec<Tool>> {
        self.defs
            .iter()
            .map(|def| -> Result<Tool> {
                Ok(Tool::Function {
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters: serde_json::to_value(&def.schema)?,
                })
            })
            .collect()
    }
}

fn normalize_arguments(arguments: Value) -> Option<Value> {
    match arguments {
        Value::String(raw) => serde_json::from_str(&raw).ok(),
        other => Some(other),
    }
}
