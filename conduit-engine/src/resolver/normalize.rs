//! Credential field normalization
//!
//! Credential records store their secrets under whatever names the form that
//! created them used. Each canonical [`ConnectorAuth`] field has an alias
//! table; lookup tries each alias verbatim, then again ignoring case,
//! spaces, dashes and underscores.

use std::collections::HashMap;

use conduit_core::domain::auth::{ConnectorAuth, Credential};

pub const USERNAME_ALIASES: &[&str] = &[
    "username",
    "userName",
    "user_name",
    "user",
    "email",
    "login",
];

pub const API_KEY_ALIASES: &[&str] = &[
    "apiKey",
    "apiToken",
    "api_token",
    "API Key",
    "api_key",
    "API Token",
    "password",
];

pub const TOKEN_ALIASES: &[&str] = &[
    "token",
    "accessToken",
    "access_token",
    "personalAccessToken",
    "personal_access_token",
    "Personal Access Token",
    "bearerToken",
];

pub const CLIENT_ID_ALIASES: &[&str] = &["clientId", "client_id", "Client ID"];

pub const CLIENT_SECRET_ALIASES: &[&str] = &["clientSecret", "client_secret", "Client Secret"];

pub const TOKEN_URL_ALIASES: &[&str] = &[
    "tokenUrl",
    "token_url",
    "Token URL",
    "oauthTokenUrl",
    "tokenEndpoint",
];

/// Map a credential record onto the canonical auth shape
///
/// An empty `authType` is inferred from which fields are present.
pub fn normalize_credential(credential: &Credential) -> ConnectorAuth {
    let fields = &credential.credentials;

    let mut auth = ConnectorAuth {
        auth_type: String::new(),
        username: lookup(fields, USERNAME_ALIASES),
        api_key: lookup(fields, API_KEY_ALIASES),
        token: lookup(fields, TOKEN_ALIASES),
        client_id: lookup(fields, CLIENT_ID_ALIASES),
        client_secret: lookup(fields, CLIENT_SECRET_ALIASES),
        token_url: lookup(fields, TOKEN_URL_ALIASES),
    };

    let declared = credential.auth_type.trim().to_ascii_lowercase();
    auth.auth_type = if declared.is_empty() {
        infer_auth_type(&auth).to_string()
    } else {
        declared
    };

    auth
}

fn infer_auth_type(auth: &ConnectorAuth) -> &'static str {
    if auth.has_client_credentials() {
        "oauth2"
    } else if auth.token.is_some() {
        "token"
    } else if auth.username.is_some() && auth.api_key.is_some() {
        "basic"
    } else {
        "apikey"
    }
}

/// First non-blank value under any alias
pub fn lookup(fields: &HashMap<String, String>, aliases: &[&str]) -> Option<String> {
    let non_blank = |v: &String| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    };

    aliases
        .iter()
        .find_map(|alias| fields.get(*alias).and_then(non_blank))
        .or_else(|| {
            aliases.iter().find_map(|alias| {
                let wanted = fold(alias);
                fields
                    .iter()
                    .filter(|(key, _)| fold(key) == wanted)
                    .find_map(|(_, value)| non_blank(value))
            })
        })
}

fn fold(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(auth_type: &str, fields: &[(&str, &str)]) -> Credential {
        Credential {
            id: "cred-1".to_string(),
            name: None,
            auth_type: auth_type.to_string(),
            credentials: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            account_id: "acct".to_string(),
        }
    }

    fn assert_every_alias(aliases: &[&str], field: fn(&ConnectorAuth) -> Option<&str>) {
        for alias in aliases {
            let auth = normalize_credential(&credential("", &[(alias, "secret-value")]));
            assert_eq!(field(&auth), Some("secret-value"), "alias '{}'", alias);
        }
    }

    #[test]
    fn test_every_alias_maps_to_its_canonical_field() {
        assert_every_alias(USERNAME_ALIASES, |a| a.username.as_deref());
        assert_every_alias(API_KEY_ALIASES, |a| a.api_key.as_deref());
        assert_every_alias(TOKEN_ALIASES, |a| a.token.as_deref());
        assert_every_alias(CLIENT_ID_ALIASES, |a| a.client_id.as_deref());
        assert_every_alias(CLIENT_SECRET_ALIASES, |a| a.client_secret.as_deref());
        assert_every_alias(TOKEN_URL_ALIASES, |a| a.token_url.as_deref());
    }

    #[test]
    fn test_folded_keys_match() {
        let auth = normalize_credential(&credential("", &[("API-KEY", "k"), ("Client_Id", "c")]));
        assert_eq!(auth.api_key.as_deref(), Some("k"));
        assert_eq!(auth.client_id.as_deref(), Some("c"));
    }

    #[test]
    fn test_verbatim_alias_wins_and_blanks_are_skipped() {
        let auth = normalize_credential(&credential(
            "Basic",
            &[("apiKey", "  "), ("apiToken", "real"), ("username", "ops@acme.io")],
        ));
        assert_eq!(auth.api_key.as_deref(), Some("real"));
        assert_eq!(auth.auth_type, "basic");
    }

    #[test]
    fn test_auth_type_inference() {
        let oauth = normalize_credential(&credential(
            "",
            &[
                ("client_id", "id"),
                ("client_secret", "secret"),
                ("token_url", "https://auth/token"),
            ],
        ));
        assert_eq!(oauth.auth_type, "oauth2");

        let token = normalize_credential(&credential("", &[("accessToken", "t")]));
        assert_eq!(token.auth_type, "token");

        let basic = normalize_credential(&credential("", &[("email", "a@b"), ("API Key", "k")]));
        assert_eq!(basic.auth_type, "basic");
    }
}
