//! Validation of free-form TOML tables used by pluggable backends.
//!
//! Delivery and storage backends receive their settings as raw
//! `toml::Value` tables; each backend publishes a [`ConfigSchema`] so the
//! configuration can be checked before the backend is constructed.

use thiserror::Error;

/// Why a backend table was rejected. Field names are dotted paths for
/// nested tables and carry an index for array items.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	fn mismatch(field: &str, expected: &str, value: &toml::Value) -> Self {
		Self::TypeMismatch {
			field: field.to_string(),
			expected: expected.to_string(),
			actual: value.type_str().to_string(),
		}
	}

	/// Re-roots the offending field under `prefix`.
	fn nested(self, prefix: &str) -> Self {
		let join = |field: String| format!("{}.{}", prefix, field);
		match self {
			Self::MissingField(field) => Self::MissingField(join(field)),
			Self::InvalidValue { field, message } => Self::InvalidValue {
				field: join(field),
				message,
			},
			Self::TypeMismatch {
				field,
				expected,
				actual,
			} => Self::TypeMismatch {
				field: join(field),
				expected,
				actual,
			},
		}
	}
}

/// Accepted shape of a field value.
#[derive(Debug)]
pub enum FieldType {
	String,
	Integer { min: Option<i64>, max: Option<i64> },
	/// Integers are accepted too.
	Float { min: Option<f64>, max: Option<f64> },
	Boolean,
	Array(Box<FieldType>),
	Table(Schema),
}

fn within<T: PartialOrd + std::fmt::Display>(
	field: &str,
	value: T,
	min: Option<T>,
	max: Option<T>,
) -> Result<(), ValidationError> {
	let message = match (min, max) {
		(Some(min), _) if value < min => format!("{} is below the minimum of {}", value, min),
		(_, Some(max)) if value > max => format!("{} is above the maximum of {}", value, max),
		_ => return Ok(()),
	};
	Err(ValidationError::InvalidValue {
		field: field.to_string(),
		message,
	})
}

impl FieldType {
	fn check(&self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		match self {
			Self::String if value.is_str() => Ok(()),
			Self::String => Err(ValidationError::mismatch(field, "string", value)),
			Self::Boolean if value.is_bool() => Ok(()),
			Self::Boolean => Err(ValidationError::mismatch(field, "boolean", value)),
			Self::Integer { min, max } => match value.as_integer() {
				Some(n) => within(field, n, *min, *max),
				None => Err(ValidationError::mismatch(field, "integer", value)),
			},
			Self::Float { min, max } => {
				let number = value.as_float().or_else(|| value.as_integer().map(|n| n as f64));
				match number {
					Some(x) => within(field, x, *min, *max),
					None => Err(ValidationError::mismatch(field, "float", value)),
				}
			}
			Self::Array(item) => {
				let items = value
					.as_array()
					.ok_or_else(|| ValidationError::mismatch(field, "array", value))?;
				items
					.iter()
					.enumerate()
					.try_for_each(|(i, v)| item.check(&format!("{}[{}]", field, i), v))
			}
			Self::Table(schema) => schema.validate(value).map_err(|e| e.nested(field)),
		}
	}
}

pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field with its type and an optional extra check run after the
/// type check passes.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(&self.name, value)?;
		match &self.validator {
			Some(validator) => validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			}),
			None => Ok(()),
		}
	}
}

#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks `config`, which must be a table. Keys the schema does not
	/// name are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::mismatch("root", "table", config))?;

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.check(value)?,
				None => return Err(ValidationError::MissingField(field.name.clone())),
			}
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}
		Ok(())
	}
}

/// Implemented by every pluggable backend for its own settings table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
