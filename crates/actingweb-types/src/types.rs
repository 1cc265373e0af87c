//! Common types used throughout the ActingWeb runtime.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::SystemTime;

// Timestamp //
//***********//
#[derive(Clone, Copy, Debug, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs() as i64)
	}

	pub fn from_now(delta: i64) -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(res.as_secs() as i64 + delta)
	}

	/// Add seconds to this timestamp
	pub fn add_seconds(&self, seconds: i64) -> Timestamp {
		Timestamp(self.0 + seconds)
	}

	/// Seconds elapsed from this timestamp until now. Negative if in the future.
	pub fn age_seconds(&self) -> i64 {
		Timestamp::now().0 - self.0
	}

	/// ISO-8601 UTC representation with a trailing 'Z', as used in callback
	/// envelopes.
	pub fn to_iso(&self) -> String {
		chrono::DateTime::<chrono::Utc>::from_timestamp(self.0, 0)
			.unwrap_or_default()
			.format("%Y-%m-%dT%H:%M:%SZ")
			.to_string()
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::cmp::PartialEq for Timestamp {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl std::cmp::PartialOrd for Timestamp {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::cmp::Eq for Timestamp {}

impl std::cmp::Ord for Timestamp {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.cmp(&other.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Granularity //
//*************//
/// Callback granularity of a subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Granularity {
	/// Full diff data delivered in the callback body.
	#[default]
	High,
	/// Only a URL to the diff is delivered.
	Low,
	/// No callbacks; the subscriber polls.
	None,
}

impl Granularity {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::High => "high",
			Self::Low => "low",
			Self::None => "none",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"high" => Some(Self::High),
			"low" => Some(Self::Low),
			"none" => Some(Self::None),
			_ => None,
		}
	}
}

impl Serialize for Granularity {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Granularity {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Granularity::parse(&s)
			.ok_or_else(|| serde::de::Error::custom(format!("unknown granularity: {}", s)))
	}
}

// Patch<T> - For PATCH semantics //
//**********************************//
/// Represents a field in a partial update with three states:
/// - `Undefined`: Field not present - don't change existing value
/// - `Null`: Field present with null value - clear it
/// - `Value(T)`: Field present with value - update to this value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Patch<T> {
	#[default]
	Undefined,
	Null,
	Value(T),
}

impl<T> Patch<T> {
	pub fn is_undefined(&self) -> bool {
		matches!(self, Patch::Undefined)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Patch::Null)
	}

	pub fn is_value(&self) -> bool {
		matches!(self, Patch::Value(_))
	}

	/// Returns the value if `Value`, otherwise None
	pub fn value(&self) -> Option<&T> {
		match self {
			Patch::Value(v) => Some(v),
			_ => None,
		}
	}

	/// Converts to Option: Undefined -> None, Null -> Some(None), Value(v) -> Some(Some(v))
	pub fn as_option(&self) -> Option<Option<&T>> {
		match self {
			Patch::Undefined => None,
			Patch::Null => Some(None),
			Patch::Value(v) => Some(Some(v)),
		}
	}

	/// Maps a `Patch<T>` to `Patch<U>` by applying a function to the contained value
	pub fn map<U, F>(self, f: F) -> Patch<U>
	where
		F: FnOnce(T) -> U,
	{
		match self {
			Patch::Undefined => Patch::Undefined,
			Patch::Null => Patch::Null,
			Patch::Value(v) => Patch::Value(f(v)),
		}
	}
}

impl<T> Serialize for Patch<T>
where
	T: Serialize,
{
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match self {
			Patch::Undefined | Patch::Null => serializer.serialize_none(),
			Patch::Value(v) => v.serialize(serializer),
		}
	}
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
	T: Deserialize<'de>,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<T>::deserialize(deserializer).map(|opt| match opt {
			None => Patch::Null,
			Some(v) => Patch::Value(v),
		})
	}
}

// API envelope //
//**************//

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
	pub error: ErrorDetails,
}

/// Error details with structured code and message
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
	pub code: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
	pub fn new(code: String, message: String) -> Self {
		Self { error: ErrorDetails { code, message, details: None } }
	}

	pub fn with_details(mut self, details: serde_json::Value) -> Self {
		self.error.details = Some(details);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timestamp_iso() {
		assert_eq!(Timestamp(0).to_iso(), "1970-01-01T00:00:00Z");
		assert_eq!(Timestamp(1735689600).to_iso(), "2025-01-01T00:00:00Z");
	}

	#[test]
	fn test_patch_deserialize() {
		#[derive(Deserialize, Default)]
		struct Body {
			#[serde(default)]
			name: Patch<String>,
		}

		let b: Body = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
		assert_eq!(b.name, Patch::Value("x".to_string()));
		let b: Body = serde_json::from_str(r#"{"name": null}"#).unwrap();
		assert!(b.name.is_null());
		let b: Body = serde_json::from_str("{}").unwrap();
		assert!(b.name.is_undefined());
	}

	#[test]
	fn test_granularity_roundtrip() {
		for g in [Granularity::High, Granularity::Low, Granularity::None] {
			assert_eq!(Granularity::parse(g.as_str()), Some(g));
		}
		assert_eq!(Granularity::parse("medium"), None);
	}
}

// vim: ts=4
