//! Bearer credential extraction.
//!
//! Every authenticated endpoint takes the upstream refresh token as a
//! bearer token. A `US:`/`HK:` prefix on the token selects the region.

use crate::error::ApiError;
use axum::http::HeaderMap;
use dreamgate::credential::Credential;

/// Extracts the raw bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("malformed Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .unwrap_or(header)
        .trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("empty bearer token"));
    }
    Ok(token.to_string())
}

/// Extracts and parses the credential.
pub fn credential(headers: &HeaderMap) -> Result<Credential, ApiError> {
    let token = bearer_token(headers)?;
    let credential = Credential::parse(&token);
    if credential.is_empty() {
        return Err(ApiError::unauthorized("empty refresh token"));
    }
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;
    use dreamgate::credential::Region;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        let headers = headers_with("Bearer my-token");
        assert_eq!(bearer_token(&headers).unwrap(), "my-token");
    }

    #[test]
    fn test_bare_token_accepted() {
        let headers = headers_with("my-token");
        assert_eq!(bearer_token(&headers).unwrap(), "my-token");
    }

    #[test]
    fn test_missing_header_is_401() {
        let err = bearer_token(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_region_prefix_flows_through() {
        let headers = headers_with("Bearer US:my-token");
        let credential = credential(&headers).unwrap();
        assert_eq!(credential.region(), Region::Us);
        assert_eq!(credential.token(), "my-token");
    }

    #[test]
    fn test_empty_token_is_401() {
        let headers = headers_with("Bearer   ");
        assert!(bearer_token(&headers).is_err());
    }
}
