//! Credential masking
//!
//! Connection strings are kept in [`SecretString`]s and only ever rendered
//! through [`mask_connection_string`], which hides shared-access secrets while
//! keeping the endpoint readable.

use crate::broker::BrokerEndpoint;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use secrecy::{ExposeSecret, SecretString};

lazy_static! {
    static ref SHARED_ACCESS_SECRET: Regex =
        Regex::new(r"(?i)(^|;)(\s*(?:SharedAccessKey|SharedAccessSignature)\s*=)([^;]*)")
            .expect("shared access pattern is valid");
}

/// Masks a secret for safe logging
///
/// Shows only the first 3 and last 3 characters. Secrets shorter than 10
/// characters are fully masked as "****".
///
/// # Examples
///
/// ```
/// use cloud_messaging::security::mask_secret;
///
/// assert_eq!(mask_secret("abcdef123456"), "abc...456");
/// assert_eq!(mask_secret("short"), "****");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

/// Masks the shared access secrets of a Service Bus connection string
///
/// # Examples
///
/// ```
/// use cloud_messaging::security::mask_connection_string;
///
/// let masked = mask_connection_string(
///     "Endpoint=sb://demo.servicebus.windows.net/;SharedAccessKeyName=root;SharedAccessKey=c2VjcmV0LWtleS12YWx1ZQ==",
/// );
/// assert_eq!(
///     masked,
///     "Endpoint=sb://demo.servicebus.windows.net/;SharedAccessKeyName=root;SharedAccessKey=c2V...Q=="
/// );
/// ```
pub fn mask_connection_string(connection_string: &str) -> String {
    SHARED_ACCESS_SECRET
        .replace_all(connection_string, |caps: &Captures| {
            format!("{}{}{}", &caps[1], &caps[2], mask_secret(caps[3].trim()))
        })
        .into_owned()
}

/// Printable identity of an endpoint with secrets masked
pub fn endpoint_label(endpoint: &BrokerEndpoint) -> String {
    match endpoint {
        BrokerEndpoint::ConnectionString(secret) => mask_connection_string(secret.expose_secret()),
        BrokerEndpoint::Project { project_id } => format!("projects/{project_id}"),
    }
}

/// Wrap a connection string so it cannot leak through `Debug` output
pub fn secret_connection_string(value: &str) -> SecretString {
    SecretString::new(value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret_with_short_secret() {
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret(""), "****");
    }

    #[test]
    fn test_mask_secret_with_long_secret() {
        assert_eq!(mask_secret("abcdef123456"), "abc...456");
        assert_eq!(mask_secret("very-long-token-string"), "ver...ing");
    }

    #[test]
    fn test_mask_connection_string_keeps_key_name() {
        let masked = mask_connection_string(
            "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=abcdefghijklmnop",
        );

        assert!(masked.contains("SharedAccessKeyName=RootManageSharedAccessKey"));
        assert!(masked.contains("SharedAccessKey=abc...nop"));
        assert!(!masked.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_mask_connection_string_signature() {
        let masked = mask_connection_string(
            "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessSignature=SharedAccessSignature sr=x&sig=y",
        );

        assert!(masked.ends_with("SharedAccessSignature=Sha...g=y"));
    }

    #[test]
    fn test_mask_connection_string_short_key() {
        let masked = mask_connection_string("Endpoint=sb://ns/;SharedAccessKey=abc");
        assert_eq!(masked, "Endpoint=sb://ns/;SharedAccessKey=****");
    }

    #[test]
    fn test_mask_connection_string_without_secret() {
        let input = "Endpoint=sb://ns.servicebus.windows.net/";
        assert_eq!(mask_connection_string(input), input);
    }

    #[test]
    fn test_endpoint_label() {
        let secret = BrokerEndpoint::ConnectionString(secret_connection_string(
            "Endpoint=sb://ns/;SharedAccessKey=0123456789abcdef",
        ));
        assert_eq!(
            endpoint_label(&secret),
            "Endpoint=sb://ns/;SharedAccessKey=012...def"
        );

        let project = BrokerEndpoint::Project {
            project_id: "demo".to_string(),
        };
        assert_eq!(endpoint_label(&project), "projects/demo");
    }

    #[test]
    fn test_secret_is_not_debug_printed() {
        let secret = secret_connection_string("SharedAccessKey=0123456789abcdef");
        assert!(!format!("{secret:?}").contains("0123456789abcdef"));
    }
}
