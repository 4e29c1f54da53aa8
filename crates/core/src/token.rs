//! OAuth callback token extraction.
//!
//! Unlinked users are asked to visit the VK OAuth page and paste back the
//! redirect URL from the address bar. The token arrives in the URL fragment,
//! never in the query string. Any validation miss yields `None`; the caller
//! re-prompts and the user cannot tell a malformed URL from no URL at all.

use std::collections::HashMap;

use url::Url;

const REDIRECT_HOST: &str = "oauth.vk.com";
const CALLBACK_PATH: &str = "/blank.html";

/// Pulls the `access_token` out of a pasted redirect URL.
///
/// The URL must be https on the fixed callback host and path, carry all
/// parameters in a non-empty fragment with an empty query string, mark the
/// token as non-expiring (`expires_in=0`), and name the sender itself in
/// `user_id` so that pasting someone else's callback URL does nothing.
pub fn extract_token(raw_url: &str, expected_user_id: &str) -> Option<String> {
    let url = Url::parse(raw_url).ok()?;

    if url.scheme() != "https" {
        return None;
    }
    if url.host_str() != Some(REDIRECT_HOST) {
        return None;
    }
    if url.path() != CALLBACK_PATH {
        return None;
    }
    if !url.query().unwrap_or_default().is_empty() {
        return None;
    }

    let fragment = url.fragment().filter(|fragment| !fragment.is_empty())?;
    let params: HashMap<String, String> = url::form_urlencoded::parse(fragment.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let access_token = params.get("access_token").filter(|token| !token.is_empty())?;
    if params.get("expires_in").map(String::as_str) != Some("0") {
        return None;
    }
    if params.get("user_id").map(String::as_str) != Some(expected_user_id) {
        return None;
    }

    Some(access_token.clone())
}

#[cfg(test)]
mod tests {
    use super::extract_token;

    const VALID: &str = "https://oauth.vk.com/blank.html#access_token=ABC123&expires_in=0&user_id=42";

    #[test]
    fn extracts_token_from_valid_callback_url() {
        assert_eq!(extract_token(VALID, "42").as_deref(), Some("ABC123"));
    }

    #[test]
    fn rejects_every_single_field_corruption() {
        let cases: &[(&str, &str)] = &[
            ("non-https scheme", "http://oauth.vk.com/blank.html#access_token=ABC123&expires_in=0&user_id=42"),
            ("wrong host", "https://oauth.evil.com/blank.html#access_token=ABC123&expires_in=0&user_id=42"),
            ("missing host", "https:///blank.html#access_token=ABC123&expires_in=0&user_id=42"),
            ("wrong path", "https://oauth.vk.com/callback#access_token=ABC123&expires_in=0&user_id=42"),
            ("empty fragment", "https://oauth.vk.com/blank.html#"),
            ("no fragment", "https://oauth.vk.com/blank.html"),
            ("params in query string", "https://oauth.vk.com/blank.html?access_token=ABC123&expires_in=0&user_id=42"),
            ("non-empty query string", "https://oauth.vk.com/blank.html?state=1#access_token=ABC123&expires_in=0&user_id=42"),
            ("missing access_token", "https://oauth.vk.com/blank.html#expires_in=0&user_id=42"),
            ("empty access_token", "https://oauth.vk.com/blank.html#access_token=&expires_in=0&user_id=42"),
            ("missing expires_in", "https://oauth.vk.com/blank.html#access_token=ABC123&user_id=42"),
            ("expiring token", "https://oauth.vk.com/blank.html#access_token=ABC123&expires_in=86400&user_id=42"),
            ("missing user_id", "https://oauth.vk.com/blank.html#access_token=ABC123&expires_in=0"),
            ("someone else's user_id", "https://oauth.vk.com/blank.html#access_token=ABC123&expires_in=0&user_id=43"),
            ("not a url", "paste me the link please"),
        ];

        for (label, raw_url) in cases {
            assert_eq!(extract_token(raw_url, "42"), None, "case `{label}` must be rejected");
        }
    }

    #[test]
    fn user_id_comparison_is_exact_string_match() {
        let padded = "https://oauth.vk.com/blank.html#access_token=ABC123&expires_in=0&user_id=042";
        assert_eq!(extract_token(padded, "42"), None);
    }
}
