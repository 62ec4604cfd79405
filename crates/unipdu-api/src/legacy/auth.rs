// Legacy API authentication
//
// Cookie-based session login/logout and controller platform detection.
// The login endpoint sets a session cookie in the client's jar;
// subsequent requests and the WebSocket upgrade use that cookie.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::auth::ControllerPlatform;
use crate::error::Error;
use crate::legacy::client::{LegacyClient, status_error};

impl LegacyClient {
    /// Authenticate with the controller using username/password.
    ///
    /// On success the session cookie is stored in the client's cookie jar
    /// and used for all subsequent requests. The login endpoint differs
    /// by platform:
    /// - UniFi OS: `POST /api/auth/login`
    /// - Standalone: `POST /api/login`
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        let url = self.base_url().join(self.platform().login_path())?;

        debug!("logging in at {}", url);

        let body = json!({
            "username": username,
            "password": password.expose_secret(),
            "remember": true,
        });

        let resp = self
            .http()
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::Authentication {
                        message: format!("login failed (HTTP {status}): {body}"),
                    }
                }
                _ => status_error(status, &body),
            });
        }

        // Capture CSRF token from login response; required for all
        // POST/PUT/DELETE requests through the UniFi OS proxy.
        if let Some(token) = resp
            .headers()
            .get("X-CSRF-Token")
            .or_else(|| resp.headers().get("x-csrf-token"))
            .and_then(|v| v.to_str().ok())
        {
            self.set_csrf_token(token.to_owned());
        }

        debug!("login successful");
        Ok(())
    }

    /// End the current session.
    pub async fn logout(&self) -> Result<(), Error> {
        let url = self.base_url().join(self.platform().logout_path())?;

        debug!("logging out at {}", url);

        let _resp = self
            .http()
            .post(url)
            .send()
            .await
            .map_err(Error::Transport)?;

        debug!("logout complete");
        Ok(())
    }

    /// Detect which platform the controller runs and remember it.
    ///
    /// Tries the UniFi OS endpoint first (`/api/auth/login`). If it
    /// responds with anything but 404, we're on UniFi OS. Otherwise falls
    /// back to the standalone endpoint. Gateway errors (502/503) are
    /// reported as such so callers can retry later.
    pub async fn check_unifi_os(&self) -> Result<ControllerPlatform, Error> {
        let unifi_os_url = self.base_url().join("/api/auth/login")?;

        debug!("probing UniFi OS at {}", unifi_os_url);

        let resp = self
            .http()
            .get(unifi_os_url)
            .send()
            .await
            .map_err(Error::Transport)?;

        let platform = match resp.status() {
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
                return Err(status_error(resp.status(), ""));
            }
            StatusCode::NOT_FOUND => {
                let standalone_url = self.base_url().join("/api/login")?;
                debug!("probing standalone at {}", standalone_url);

                let resp = self
                    .http()
                    .get(standalone_url)
                    .send()
                    .await
                    .map_err(Error::Transport)?;

                if resp.status() == StatusCode::NOT_FOUND {
                    return Err(Error::UnknownProtocol(
                        "neither UniFi OS nor standalone login endpoint found".into(),
                    ));
                }
                ControllerPlatform::ClassicController
            }
            _ => ControllerPlatform::UnifiOs,
        };

        debug!(?platform, "detected controller platform");
        self.set_platform(platform);
        Ok(platform)
    }
}
