use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::LayerError;

/// Delimiter between a layer path and its format arguments.
pub const FORMAT_ARGS_DELIMITER: &str = ":STRATA_FORMAT_ARGS:";

/// Reserved prefix for anonymous layer identifiers.
pub const ANONYMOUS_PREFIX: &str = "anon:";

/// Key/value arguments carried in a layer identifier.
pub type FormatArguments = BTreeMap<String, String>;

/// True for identifiers in the reserved anonymous form. External code must
/// only compare identifiers with string equality, never parse this form.
pub fn is_anonymous_identifier(identifier: &str) -> bool {
	identifier.starts_with(ANONYMOUS_PREFIX)
}

/// Generates a fresh anonymous identifier, `anon:<serial>[:<tag>]`. The
/// serial is unique for the process lifetime.
pub fn generate_anonymous_identifier(tag: &str) -> String {
	static SERIAL: AtomicU64 = AtomicU64::new(1);
	let serial = SERIAL.fetch_add(1, Ordering::Relaxed);
	if tag.is_empty() {
		format!("{ANONYMOUS_PREFIX}{serial:016x}")
	} else {
		format!("{ANONYMOUS_PREFIX}{serial:016x}:{tag}")
	}
}

/// Splits an identifier into its layer path and format arguments.
///
/// The grammar is `<layerPath>[:STRATA_FORMAT_ARGS:key=value;...]`.
/// Anonymous identifiers never carry arguments and pass through whole.
pub fn split_identifier(identifier: &str) -> Result<(String, FormatArguments), LayerError> {
	if identifier.is_empty() {
		return Err(LayerError::InvalidIdentifier {
			identifier: identifier.to_owned(),
			reason: "empty identifier",
		});
	}
	if is_anonymous_identifier(identifier) {
		return Ok((identifier.to_owned(), FormatArguments::new()));
	}
	let Some((layer_path, args_text)) = identifier.split_once(FORMAT_ARGS_DELIMITER) else {
		return Ok((identifier.to_owned(), FormatArguments::new()));
	};
	let mut args = FormatArguments::new();
	for pair in args_text.split(';').filter(|pair| !pair.is_empty()) {
		let Some((key, value)) = pair.split_once('=') else {
			return Err(LayerError::InvalidIdentifier {
				identifier: identifier.to_owned(),
				reason: "malformed format argument (expected key=value)",
			});
		};
		args.insert(key.to_owned(), value.to_owned());
	}
	Ok((layer_path.to_owned(), args))
}

/// Rebuilds a canonical identifier from a layer path and arguments. The
/// arguments sort by key, so equal (path, args) pairs always produce equal
/// strings.
pub fn join_identifier(layer_path: &str, args: &FormatArguments) -> String {
	if args.is_empty() {
		return layer_path.to_owned();
	}
	let args_text: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
	format!("{layer_path}{FORMAT_ARGS_DELIMITER}{}", args_text.join(";"))
}
