use serde::Deserialize;
use tracing::warn;

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifies a client-supplied reCAPTCHA response token. Network or decode
/// failures count as unverified rather than failing the surrounding request.
pub async fn verify_recaptcha(client: &reqwest::Client, secret: &str, token: &str) -> bool {
    let params = [("secret", secret), ("response", token)];
    let response = match client.post(SITEVERIFY_URL).form(&params).send().await {
        Ok(response) => response,
        Err(error) => {
            warn!(%error, "recaptcha verification request failed");
            return false;
        }
    };
    match response.json::<SiteverifyResponse>().await {
        Ok(body) => {
            if !body.success {
                warn!(error_codes = ?body.error_codes, "recaptcha rejected token");
            }
            body.success
        }
        Err(error) => {
            warn!(%error, "could not decode recaptcha verification response");
            false
        }
    }
}
