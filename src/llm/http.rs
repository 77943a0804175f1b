use crate::error::LlmError;
use reqwest::StatusCode;

const MAX_API_ERROR_CHARS: usize = 200;

/// Redact bearer-style secrets that providers sometimes echo back in error
/// bodies, then cap the length.
pub fn sanitize_api_error(body: &str) -> String {
    let redacted: Vec<String> = body
        .split_whitespace()
        .map(|word| {
            let bare = word.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | ':'));
            if bare.starts_with("sk-") && bare.len() > 8 {
                word.replace(bare, "[REDACTED]")
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = redacted.join(" ");

    if joined.chars().count() <= MAX_API_ERROR_CHARS {
        return joined;
    }
    let truncated: String = joined.chars().take(MAX_API_ERROR_CHARS).collect();
    format!("{truncated}...")
}

/// Map a failed HTTP response onto the provider error taxonomy.
pub async fn api_error(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let retry_after_secs = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());

    classify_status(provider, status, retry_after_secs, &body)
}

fn classify_status(
    provider: &str,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth {
            provider: provider.to_string(),
        },
        _ if body.contains("rate_limit") => LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        },
        _ => LlmError::Request {
            provider: provider.to_string(),
            message: format!("API error ({status}): {}", sanitize_api_error(body)),
        },
    }
}
