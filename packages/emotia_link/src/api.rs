//! Request/response side of the backend.
//!
//! Only what the real-time flows need: login, the chat lookups, and generic
//! JSON helpers with the session's bearer token attached. Admin screens build
//! on the generic helpers.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::session::{Role, SessionContext, UserId};

#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub role: Role,
    pub user_id: UserId,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Contact {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssignedPsychologist {
    pub psychologist_id: UserId,
    pub psychologist_name: String,
    pub psychologist_email: Option<String>,
}

#[derive(Deserialize)]
struct AssignedBody {
    psychologist_id: Option<UserId>,
    #[serde(default)]
    psychologist_name: String,
    #[serde(default)]
    psychologist_email: Option<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self {
            http: reqwest::Client::new(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Exchange credentials for a bearer token. No session exists yet, so
    /// this takes the base URL directly.
    pub async fn login(base_url: &str, email: &str, password: &str) -> Result<LoginResponse> {
        let email = email.trim();
        let password = password.trim();
        if email.is_empty() || password.is_empty() {
            return Err(LinkError::InvalidInput(
                "Please fill in both email and password.".to_string(),
            ));
        }

        let url = SessionContext::new(base_url, UserId(0)).api_url("/login");
        let resp = reqwest::Client::new()
            .post(url)
            .json(&LoginBody { email, password })
            .send()
            .await
            .map_err(LinkError::from_reqwest)?;
        let resp = check_status(resp).await?;
        resp.json().await.map_err(LinkError::from_reqwest)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self.http.request(method, self.session.api_url(path));
        match &self.session.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn send(&self, rb: RequestBuilder) -> Result<Response> {
        let resp = rb.send().await.map_err(LinkError::from_reqwest)?;
        check_status(resp).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let resp = self.send(self.request(Method::GET, path)).await?;
        resp.json().await.map_err(LinkError::from_reqwest)
    }

    /// GET returning the raw body, for callers that tolerate malformed JSON.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        debug!(path, "GET");
        let resp = self.send(self.request(Method::GET, path)).await?;
        resp.text().await.map_err(LinkError::from_reqwest)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        let resp = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        resp.json().await.map_err(LinkError::from_reqwest)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        debug!(path, "DELETE");
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Patients assigned to a psychologist.
    pub async fn contacts(&self, psychologist: UserId) -> Result<Vec<Contact>> {
        self.get_json(&format!("/chat/contacts/{psychologist}")).await
    }

    /// The patient's assigned psychologist, or `None` when there is none.
    pub async fn assigned_psychologist(
        &self,
        patient: UserId,
    ) -> Result<Option<AssignedPsychologist>> {
        let body: AssignedBody = match self.get_json(&format!("/chat/assigned/{patient}")).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(body.psychologist_id.map(|id| AssignedPsychologist {
            psychologist_id: id,
            psychologist_name: body.psychologist_name,
            psychologist_email: body.psychologist_email,
        }))
    }
}

/// Turn a non-2xx response into `LinkError::Api` using the body's `detail`.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("detail").cloned())
        .map(|detail| match detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| "unknown error".to_string());
    Err(LinkError::Api {
        status: status.as_u16(),
        detail,
    })
}
