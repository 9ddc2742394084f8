//! Function catalog for function-calling requests
//!
//! A [`Functions`] value holds an ordered list of callable-function
//! descriptors in the shape the chat endpoint expects. All mutators report
//! success or failure through their boolean return; the set/append
//! asymmetry (set fails once a value exists, append requires one) guards
//! against accidental silent overwrites.

use serde_json::{json, Map, Value};

/// A typed parameter of a catalog function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParameter {
    pub name: String,
    /// JSON-schema type, e.g. `"string"`
    pub param_type: String,
    pub description: String,
    /// Optional enumeration of allowed values
    pub enumeration: Option<Vec<String>>,
}

impl FunctionParameter {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            enumeration: None,
        }
    }

    pub fn with_enumeration(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.enumeration = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct FunctionDescriptor {
    name: String,
    description: Option<String>,
    parameters: Vec<FunctionParameter>,
    required: Vec<String>,
}

/// Ordered, name-unique registry of function descriptors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Functions {
    descriptors: Vec<FunctionDescriptor>,
}

impl Functions {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Add a function by name. Fails if the name is empty or already taken.
    #[must_use]
    pub fn add_function(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.is_empty() || self.index_of(&name).is_some() {
            return false;
        }
        self.descriptors.push(FunctionDescriptor {
            name,
            ..FunctionDescriptor::default()
        });
        true
    }

    /// Add several functions; fails (without rollback of earlier adds) as
    /// soon as one name is rejected.
    #[must_use]
    pub fn add_functions(&mut self, names: impl IntoIterator<Item = impl Into<String>>) -> bool {
        for name in names {
            if !self.add_function(name) {
                return false;
            }
        }
        true
    }

    /// Remove a function and everything attached to it.
    #[must_use]
    pub fn pop_function(&mut self, name: &str) -> bool {
        match self.index_of(name) {
            Some(index) => {
                self.descriptors.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn pop_functions<'n>(&mut self, names: impl IntoIterator<Item = &'n str>) -> bool {
        for name in names {
            if !self.pop_function(name) {
                return false;
            }
        }
        true
    }

    /// Set a function's description. Fails if one is already set; pop it
    /// first to replace it.
    #[must_use]
    pub fn set_description(&mut self, target: &str, description: impl Into<String>) -> bool {
        match self.index_of(target) {
            Some(index) if self.descriptors[index].description.is_none() => {
                self.descriptors[index].description = Some(description.into());
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn pop_description(&mut self, target: &str) -> bool {
        match self.index_of(target) {
            Some(index) => self.descriptors[index].description.take().is_some(),
            None => false,
        }
    }

    /// Set the required-parameter names. Fails if a required list exists.
    #[must_use]
    pub fn set_required(
        &mut self,
        target: &str,
        params: impl IntoIterator<Item = impl Into<String>>,
    ) -> bool {
        match self.index_of(target) {
            Some(index) if self.descriptors[index].required.is_empty() => {
                self.descriptors[index].required = params.into_iter().map(Into::into).collect();
                true
            }
            _ => false,
        }
    }

    /// Append to a previously set required list.
    #[must_use]
    pub fn append_required(&mut self, target: &str, param: impl Into<String>) -> bool {
        match self.index_of(target) {
            Some(index) if !self.descriptors[index].required.is_empty() => {
                self.descriptors[index].required.push(param.into());
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn pop_required(&mut self, target: &str) -> bool {
        match self.index_of(target) {
            Some(index) if !self.descriptors[index].required.is_empty() => {
                self.descriptors[index].required.clear();
                true
            }
            _ => false,
        }
    }

    /// Set a function's first parameter. Fails if parameters already exist;
    /// append thereafter.
    #[must_use]
    pub fn set_parameter(&mut self, target: &str, parameter: FunctionParameter) -> bool {
        self.set_parameters(target, [parameter])
    }

    #[must_use]
    pub fn set_parameters(
        &mut self,
        target: &str,
        parameters: impl IntoIterator<Item = FunctionParameter>,
    ) -> bool {
        match self.index_of(target) {
            Some(index) if self.descriptors[index].parameters.is_empty() => {
                self.descriptors[index].parameters = parameters.into_iter().collect();
                true
            }
            _ => false,
        }
    }

    /// Append a parameter to a previously set parameter list.
    #[must_use]
    pub fn append_parameter(&mut self, target: &str, parameter: FunctionParameter) -> bool {
        self.append_parameters(target, [parameter])
    }

    #[must_use]
    pub fn append_parameters(
        &mut self,
        target: &str,
        parameters: impl IntoIterator<Item = FunctionParameter>,
    ) -> bool {
        match self.index_of(target) {
            Some(index) if !self.descriptors[index].parameters.is_empty() => {
                self.descriptors[index].parameters.extend(parameters);
                true
            }
            _ => false,
        }
    }

    /// Remove all of a function's parameters, including its required list.
    #[must_use]
    pub fn pop_parameters(&mut self, target: &str) -> bool {
        match self.index_of(target) {
            Some(index) => {
                self.descriptors[index].parameters.clear();
                self.descriptors[index].required.clear();
                true
            }
            None => false,
        }
    }

    /// Remove selected parameters by name.
    #[must_use]
    pub fn pop_parameters_named<'n>(
        &mut self,
        target: &str,
        names: impl IntoIterator<Item = &'n str>,
    ) -> bool {
        let Some(index) = self.index_of(target) else {
            return false;
        };
        for name in names {
            let before = self.descriptors[index].parameters.len();
            self.descriptors[index].parameters.retain(|p| p.name != name);
            if self.descriptors[index].parameters.len() == before {
                return false;
            }
        }
        true
    }

    /// Serialize to the wire shape:
    /// `[{name, description?, parameters: {type, properties, required?}}]`.
    pub fn to_json(&self) -> Value {
        let mut out = Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            let mut entry = Map::new();
            entry.insert("name".to_string(), json!(descriptor.name));
            if let Some(description) = &descriptor.description {
                entry.insert("description".to_string(), json!(description));
            }
            if !descriptor.parameters.is_empty() || !descriptor.required.is_empty() {
                let mut properties = Map::new();
                for parameter in &descriptor.parameters {
                    let mut schema = Map::new();
                    schema.insert("type".to_string(), json!(parameter.param_type));
                    schema.insert("description".to_string(), json!(parameter.description));
                    if let Some(enumeration) = &parameter.enumeration {
                        schema.insert("enum".to_string(), json!(enumeration));
                    }
                    properties.insert(parameter.name.clone(), Value::Object(schema));
                }
                let mut parameters = Map::new();
                parameters.insert("type".to_string(), json!("object"));
                parameters.insert("properties".to_string(), Value::Object(properties));
                if !descriptor.required.is_empty() {
                    parameters.insert("required".to_string(), json!(descriptor.required));
                }
                entry.insert("parameters".to_string(), Value::Object(parameters));
            }
            out.push(Value::Object(entry));
        }
        Value::Array(out)
    }

    /// Rebuild a catalog from its wire shape; used by conversation import.
    pub fn from_json(value: &Value) -> Option<Self> {
        let entries = value.as_array()?;
        let mut functions = Functions::new();
        for entry in entries {
            let name = entry.get("name")?.as_str()?;
            let mut descriptor = FunctionDescriptor {
                name: name.to_string(),
                ..FunctionDescriptor::default()
            };
            if let Some(description) = entry.get("description").and_then(Value::as_str) {
                descriptor.description = Some(description.to_string());
            }
            if let Some(parameters) = entry.get("parameters") {
                if let Some(properties) =
                    parameters.get("properties").and_then(Value::as_object)
                {
                    for (param_name, schema) in properties {
                        let mut parameter = FunctionParameter::new(
                            param_name,
                            schema.get("type").and_then(Value::as_str).unwrap_or_default(),
                            schema
                                .get("description")
                                .and_then(Value::as_str)
                                .unwrap_or_default(),
                        );
                        if let Some(enumeration) =
                            schema.get("enum").and_then(Value::as_array)
                        {
                            parameter.enumeration = Some(
                                enumeration
                                    .iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect(),
                            );
                        }
                        descriptor.parameters.push(parameter);
                    }
                }
                if let Some(required) = parameters.get("required").and_then(Value::as_array) {
                    descriptor.required = required
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
            }
            functions.descriptors.push(descriptor);
        }
        Some(functions)
    }
}
