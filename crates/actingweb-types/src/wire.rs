//! Wire types of the ActingWeb v1.4 protocol: callback envelopes, list diffs,
//! and the peer-to-peer trust/subscription request bodies.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::types::Granularity;

/// Option tags advertised under `/meta/actingweb/supported`. Only tags that
/// are actually implemented may appear here.
pub const SUPPORTED_OPTIONS: &[&str] = &[
	"www",
	"oauth",
	"callbacks",
	"trust",
	"onewaytrust",
	"subscriptions",
	"actions",
	"resources",
	"methods",
	"nestedproperties",
	"listproperties",
	"trustpermissions",
	"subscriptionresync",
	"callbackcompression",
	"permissionquery",
];

// Callbacks
//***********

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackType {
	#[default]
	Diff,
	Resync,
}

/// Envelope of a subscription callback.
///
/// For `granularity="high"` the body carries `data`; for `"low"` it carries
/// `url`. `type` is absent for ordinary diffs.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackEnvelope {
	pub id: Box<str>,
	pub target: Box<str>,
	pub subtarget: Option<Box<str>>,
	pub resource: Option<Box<str>>,
	#[serde(rename = "subscriptionid")]
	pub subscription_id: Box<str>,
	pub sequence: u32,
	/// ISO-8601 UTC with trailing 'Z'.
	pub timestamp: Box<str>,
	pub granularity: Granularity,
	#[serde(rename = "type", default, skip_serializing_if = "is_diff")]
	pub typ: CallbackType,
	pub data: Option<serde_json::Value>,
	pub url: Option<Box<str>>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_diff(t: &CallbackType) -> bool {
	*t == CallbackType::Diff
}

// List diffs
//************

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOperation {
	Append,
	Insert,
	Update,
	Extend,
	Delete,
	Pop,
	Clear,
	DeleteAll,
	Metadata,
}

/// Diff payload of a list-property change. `length` is present on every list
/// diff so receivers can detect missed operations cheaply.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListDiff {
	pub list: Box<str>,
	pub operation: ListOperation,
	pub item: Option<serde_json::Value>,
	pub items: Option<Vec<serde_json::Value>>,
	pub index: Option<u32>,
	pub length: u32,
}

// Trust handshake
//*****************

/// Body POSTed to `/trust/{relationship}` by the initiating actor.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustCreateBody {
	/// Initiator's actor id.
	pub id: Box<str>,
	/// Initiator's actor root URL.
	pub baseuri: Box<str>,
	#[serde(rename = "type")]
	pub peer_type: Box<str>,
	pub secret: Box<str>,
	#[serde(rename = "verificationToken")]
	pub verification_token: Option<Box<str>>,
	pub desc: Option<Box<str>>,
}

/// Body of a PUT on `/trust/{relationship}/{peerid}` — from the owner it
/// approves; from the peer it reports the peer side's approval.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrustUpdateBody {
	pub approved: Option<bool>,
	pub desc: Option<Box<str>>,
	pub baseuri: Option<Box<str>>,
}

// Subscriptions
//***************

/// Body POSTed to `/subscriptions/{peerid}` by a subscribing peer.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionCreateBody {
	pub target: Box<str>,
	pub subtarget: Option<Box<str>>,
	pub resource: Option<Box<str>>,
	#[serde(default)]
	pub granularity: Granularity,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_envelope_type_defaults_to_diff() {
		let json = r#"{
			"id": "sub1", "target": "properties", "subscriptionid": "sub1",
			"sequence": 3, "timestamp": "2025-06-01T10:00:00Z",
			"granularity": "high", "data": "hello"
		}"#;
		let env: CallbackEnvelope = serde_json::from_str(json).unwrap();
		assert_eq!(env.typ, CallbackType::Diff);
		assert_eq!(env.sequence, 3);

		// Diff type is elided on the wire
		let out = serde_json::to_string(&env).unwrap();
		assert!(!out.contains("\"type\""));
	}

	#[test]
	fn test_resync_roundtrip() {
		let json = r#"{
			"id": "s", "target": "properties", "subtarget": "memory_travel",
			"subscriptionid": "s", "sequence": 9,
			"timestamp": "2025-06-01T10:00:00Z", "granularity": "high",
			"type": "resync", "url": "https://peer/a1/properties/memory_travel"
		}"#;
		let env: CallbackEnvelope = serde_json::from_str(json).unwrap();
		assert_eq!(env.typ, CallbackType::Resync);
		let out = serde_json::to_string(&env).unwrap();
		assert!(out.contains("\"type\":\"resync\""));
	}

	#[test]
	fn test_list_diff_shape() {
		let diff = ListDiff {
			list: "memory_travel".into(),
			operation: ListOperation::Append,
			item: Some(serde_json::json!({"place": "Paris"})),
			items: None,
			index: Some(0),
			length: 1,
		};
		let v = serde_json::to_value(&diff).unwrap();
		assert_eq!(v["operation"], "append");
		assert_eq!(v["length"], 1);
		assert!(v.get("items").is_none());
	}
}

// vim: ts=4
