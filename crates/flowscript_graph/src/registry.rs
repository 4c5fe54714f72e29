// SPDX-License-Identifier: MIT OR Apache-2.0
//! Factory: registries for node templates, data types and callable
//! functions, plus the plugin registration hook.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::datatypes::{DataType, Value};
use crate::executor::ExecutionError;
use crate::node::{Node, NodeError, NodeTemplate};
use crate::nodes;

/// Bucket name for functions not bound to any data type.
pub const UNBOUND_BUCKET: &str = "UNBOUND";

/// Error raised by the registries.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Node type id collision.
    #[error("node type '{0}' is already registered")]
    NodeAlreadyRegistered(String),

    /// Node alias collision.
    #[error("node alias '{0}' is already registered")]
    AliasAlreadyRegistered(String),

    /// Data type name collision (case-insensitive).
    #[error("data type '{0}' is already registered")]
    DataTypeAlreadyRegistered(String),

    /// Unregistered node type id or alias.
    #[error("node type or alias '{0}' is not registered")]
    NodeNotFound(String),

    /// Unregistered data type name.
    #[error("data type '{0}' is not registered")]
    DataTypeNotFound(String),

    /// Unregistered function signature.
    #[error("function signature '{0}' is not registered")]
    FunctionNotFound(String),

    /// Port declaration failed while building a node.
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Callable backing a function node.
pub type NodeFunction = Arc<dyn Fn(&[Value]) -> Result<Vec<Value>, ExecutionError> + Send + Sync>;

/// A registered callable promotable to a function node.
#[derive(Clone)]
pub struct Function {
    reference: NodeFunction,
    /// Data input ports as (name, data type name) pairs.
    pub inputs: Vec<(String, String)>,
    /// Data output ports as (name, data type name) pairs.
    pub outputs: Vec<(String, String)>,
    /// Default values aligned with `inputs`.
    pub default_values: Vec<Value>,
    /// Short description.
    pub doc: String,
    /// Display name used instead of the signature, when present.
    pub nice_name: Option<String>,
    /// Palette category.
    pub category: String,
}

impl Function {
    /// Invokes the callable.
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>, ExecutionError> {
        (self.reference)(args)
    }
}

/// Registration data for a callable.
pub struct FunctionSpec {
    /// Module path the callable belongs to, e.g. `"flowscript.math"`.
    pub module: String,
    /// Callable name, e.g. `"add"`.
    pub name: String,
    /// Data type of the callable's first bound argument; `None` for free
    /// functions, which land in the `"UNBOUND"` bucket.
    pub source_data_type: Option<String>,
    /// Data input ports as (name, data type name) pairs.
    pub inputs: Vec<(String, String)>,
    /// Data output ports as (name, data type name) pairs.
    pub outputs: Vec<(String, String)>,
    /// Default values aligned with `inputs`.
    pub default_values: Vec<Value>,
    /// Display name used instead of the signature, when present.
    pub nice_name: Option<String>,
    /// Palette category.
    pub category: String,
    /// Short description.
    pub doc: String,
}

impl FunctionSpec {
    /// Creates a minimal spec for a free function.
    pub fn unbound(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            source_data_type: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            default_values: Vec::new(),
            nice_name: None,
            category: "General".to_string(),
            doc: String::new(),
        }
    }

    /// Binds the function to a data type bucket.
    pub fn bound(mut self, data_type: impl Into<String>) -> Self {
        self.source_data_type = Some(data_type.into());
        self
    }

    /// Sets the data input ports.
    pub fn with_inputs(mut self, inputs: Vec<(String, String)>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Sets the data output ports.
    pub fn with_outputs(mut self, outputs: Vec<(String, String)>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Sets the default input values.
    pub fn with_defaults(mut self, default_values: Vec<Value>) -> Self {
        self.default_values = default_values;
        self
    }

    /// Sets the palette category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    fn signature(&self) -> String {
        match &self.source_data_type {
            Some(data_type) => format!("{}.{}.{}", self.module, data_type, self.name),
            None => format!("{}({})", self.module, self.name),
        }
    }

    fn bucket(&self) -> String {
        self.source_data_type
            .as_deref()
            .unwrap_or(UNBOUND_BUCKET)
            .to_uppercase()
    }
}

/// A statically-linked registration plugin.
///
/// Mirrors the discovered-module hook: each plugin gets one chance to
/// register node templates, data types and functions. A failing plugin is
/// logged and skipped; it never aborts the batch.
pub trait Plugin {
    /// Plugin name used in logs.
    fn name(&self) -> &str;

    /// Registers the plugin's content with the factory.
    fn register(&self, factory: &mut NodeFactory) -> Result<(), RegistryError>;
}

/// Registry mapping node type ids, data type names and function signatures
/// to their constructors.
pub struct NodeFactory {
    node_templates: IndexMap<String, Arc<dyn NodeTemplate>>,
    node_names: IndexMap<String, Vec<String>>,
    aliases: IndexMap<String, String>,
    data_types: IndexMap<String, DataType>,
    functions: IndexMap<String, IndexMap<String, Function>>,
    function_names: Vec<String>,
}

impl NodeFactory {
    /// Creates a factory pre-loaded with the builtin data types and node
    /// templates.
    pub fn new() -> Self {
        let mut factory = Self {
            node_templates: IndexMap::new(),
            node_names: IndexMap::new(),
            aliases: IndexMap::new(),
            data_types: IndexMap::new(),
            functions: IndexMap::new(),
            function_names: Vec::new(),
        };
        factory.register_basic_data_types();
        factory.register_basic_nodes();
        factory
    }

    fn register_basic_data_types(&mut self) {
        for data_type in [
            DataType::exec(),
            DataType::any(),
            DataType::string(),
            DataType::numeric(),
            DataType::boolean(),
            DataType::list(),
            DataType::dict(),
        ] {
            // A fresh factory cannot collide with itself.
            if let Err(error) = self.register_data_type(data_type) {
                tracing::error!(%error, "failed to register builtin data type");
            }
        }
    }

    fn register_basic_nodes(&mut self) {
        let builtins: Vec<(Arc<dyn NodeTemplate>, &str)> = vec![
            (Arc::new(nodes::input::GraphInputNode), "input"),
            (Arc::new(nodes::logic::LoggerNode), "logger"),
            (Arc::new(nodes::logic::BranchNode), "branch"),
            (Arc::new(nodes::loops::ForEachNode), "for_each"),
            (Arc::new(nodes::getset::GetNode), "get"),
            (Arc::new(nodes::getset::SetNode), "set"),
            (Arc::new(nodes::function::FunctionNode), "function"),
            (Arc::new(nodes::subgraph::GroupNode), "group"),
        ];
        for (template, alias) in builtins {
            if let Err(error) = self.register_node(template, Some(alias)) {
                tracing::error!(%error, "failed to register builtin node");
            }
        }
    }

    /// Registers a node template, optionally under a short alias. Both the
    /// type id and the alias are checked before any state changes, so a
    /// collision leaves the registry untouched.
    pub fn register_node(
        &mut self,
        template: Arc<dyn NodeTemplate>,
        alias: Option<&str>,
    ) -> Result<(), RegistryError> {
        let type_id = template.type_id().to_string();
        if self.node_templates.contains_key(&type_id) {
            return Err(RegistryError::NodeAlreadyRegistered(type_id));
        }
        if let Some(alias) = alias {
            if self.aliases.contains_key(alias) {
                return Err(RegistryError::AliasAlreadyRegistered(alias.to_string()));
            }
        }

        let name = template.default_name().to_string();
        self.node_names.entry(name).or_default().push(type_id.clone());
        if let Some(alias) = alias {
            self.aliases.insert(alias.to_string(), type_id.clone());
        }
        self.node_templates.insert(type_id, template);
        Ok(())
    }

    /// Resolves a type id or alias to its template.
    pub fn template(&self, id_or_alias: &str) -> Option<Arc<dyn NodeTemplate>> {
        if let Some(template) = self.node_templates.get(id_or_alias) {
            return Some(Arc::clone(template));
        }
        let type_id = self.aliases.get(id_or_alias)?;
        self.node_templates.get(type_id).map(Arc::clone)
    }

    /// Creates a new node instance for a registered type id or alias.
    ///
    /// Construction cannot fail for a validly registered id: the template's
    /// port setup only consults state that registration already validated.
    pub fn create_node(&self, id_or_alias: &str) -> Result<Node, RegistryError> {
        let template = self
            .template(id_or_alias)
            .ok_or_else(|| RegistryError::NodeNotFound(id_or_alias.to_string()))?;
        let mut node = Node::new(template.as_ref());
        template.setup_ports(&mut node, self)?;
        template.setup_widgets(&mut node);
        Ok(node)
    }

    /// All registered node type ids in registration order.
    pub fn node_type_ids(&self) -> impl Iterator<Item = &str> {
        self.node_templates.keys().map(String::as_str)
    }

    /// Display names mapped to the type ids registered under them.
    pub fn node_names(&self) -> &IndexMap<String, Vec<String>> {
        &self.node_names
    }

    /// Registered aliases and the type ids they map to.
    pub fn aliases(&self) -> &IndexMap<String, String> {
        &self.aliases
    }

    /// Registers a data type. Names are unique case-insensitively and
    /// immutable after registration.
    pub fn register_data_type(&mut self, data_type: DataType) -> Result<(), RegistryError> {
        let key = data_type.name.to_uppercase();
        if self.data_types.contains_key(&key) {
            return Err(RegistryError::DataTypeAlreadyRegistered(data_type.name));
        }
        self.data_types.insert(key, data_type);
        Ok(())
    }

    /// Returns whether a data type name is registered (case-insensitive).
    pub fn is_data_type_registered(&self, name: &str) -> bool {
        self.data_types.contains_key(&name.to_uppercase())
    }

    /// Looks up a data type by name (case-insensitive).
    pub fn data_type_by_name(&self, name: &str) -> Result<&DataType, RegistryError> {
        self.data_types
            .get(&name.to_uppercase())
            .ok_or_else(|| RegistryError::DataTypeNotFound(name.to_string()))
    }

    /// All registered data types in registration order.
    pub fn data_types(&self) -> impl Iterator<Item = &DataType> {
        self.data_types.values()
    }

    /// The subset of data types flagged as runtime containers.
    pub fn runtime_data_types(&self) -> Vec<&DataType> {
        self.data_types
            .values()
            .filter(|data_type| data_type.is_runtime)
            .collect()
    }

    /// Registers a callable under a signature derived from its module,
    /// bound data type and name. Returns the signature.
    pub fn register_function(&mut self, spec: FunctionSpec, reference: NodeFunction) -> String {
        let signature = spec.signature();
        let bucket = spec.bucket();
        let function = Function {
            reference,
            inputs: spec.inputs,
            outputs: spec.outputs,
            default_values: spec.default_values,
            doc: spec.doc,
            nice_name: spec.nice_name.clone(),
            category: spec.category,
        };
        self.functions
            .entry(bucket)
            .or_default()
            .insert(signature.clone(), function);
        self.function_names
            .push(spec.nice_name.unwrap_or_else(|| signature.clone()));
        signature
    }

    /// Looks up a function across all buckets by signature.
    pub fn function_from_signature(&self, signature: &str) -> Option<&Function> {
        self.functions
            .values()
            .find_map(|bucket| bucket.get(signature))
    }

    /// All signatures registered under a data type bucket.
    pub fn function_signatures_by_type_name(&self, type_name: &str) -> Vec<&str> {
        self.functions
            .get(&type_name.to_uppercase())
            .map(|bucket| bucket.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Display names of all registered functions.
    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }

    /// Runs every plugin's registration hook once. A plugin failure is
    /// logged and does not stop the remaining plugins from loading.
    /// Returns the number of plugins that registered successfully.
    pub fn load_plugins(&mut self, plugins: &[&dyn Plugin]) -> usize {
        let mut success_count = 0;
        for plugin in plugins {
            match plugin.register(self) {
                Ok(()) => success_count += 1,
                Err(error) => {
                    tracing::error!(plugin = plugin.name(), %error, "failed to register plugin");
                }
            }
        }
        tracing::info!("registered {success_count} node graph plugins");
        success_count
    }
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new()
    }
}
