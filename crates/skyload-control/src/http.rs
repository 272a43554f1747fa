use crate::model::{
    ClusterDescriptor, ClusterSpec, DeleteRequest, IngressRule, RoleRequest, SecurityGroup,
    TrustRole,
};
use crate::{ApiFault, ControlConfig, ControlError, ControlPlane};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skyload_config::{ClusterId, RoleName};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-based control-plane client.
///
/// Speaks the JSON protocol served by `skyload-server`:
/// - `GET  /roles/<name>`, `POST /roles`, `POST /roles/<name>/policies`
/// - `POST /clusters`, `GET /clusters/<id>`, `DELETE /clusters/<id>?skip_final_snapshot=..`
/// - `GET  /vpcs/<vpc>/security-groups`, `POST /security-groups/<group>/ingress`
///
/// Error responses carry `{"code", "message"}` and are classified by
/// [`ControlError::from_fault`]. Transport failures become
/// [`ControlError::Transient`].
pub struct HttpControlPlane {
    config: ControlConfig,
    agent: ureq::Agent,
}

impl HttpControlPlane {
    pub fn new(config: ControlConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);
        Self { config, agent }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.endpoint)
    }

    fn decorate<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let req = req
            .header("X-Skyload-Protocol", &crate::PROTOCOL_VERSION.to_string())
            .header("X-Skyload-Region", &self.config.region);
        match self.config.authorization() {
            Some(auth) => req.header("Authorization", &auth),
            None => req,
        }
    }

    fn do_get(&self, path: &str) -> Result<String, ControlError> {
        let url = self.url(path);
        tracing::debug!("GET {url}");
        let result = self.decorate(self.agent.get(&url)).call();
        read_response(&url, result)
    }

    fn do_post(&self, path: &str, payload: &impl Serialize) -> Result<String, ControlError> {
        let url = self.url(path);
        let body = serde_json::to_string(payload)
            .map_err(|e| ControlError::Serialization(e.to_string()))?;
        tracing::debug!("POST {url} ({} bytes)", body.len());
        let result = self
            .decorate(self.agent.post(&url))
            .header("Content-Type", "application/json")
            .send(body.as_str());
        read_response(&url, result)
    }

    fn do_delete(&self, path: &str) -> Result<String, ControlError> {
        let url = self.url(path);
        tracing::debug!("DELETE {url}");
        let result = self.decorate(self.agent.delete(&url)).call();
        read_response(&url, result)
    }
}

fn read_response(
    url: &str,
    result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<String, ControlError> {
    let mut resp = result.map_err(|e| ControlError::Transient(format!("{url}: {e}")))?;
    let status = resp.status().as_u16();
    let body = resp
        .body_mut()
        .read_to_string()
        .map_err(|e| ControlError::Transient(format!("{url}: {e}")))?;
    if status >= 400 {
        let fault = serde_json::from_str::<ApiFault>(&body)
            .unwrap_or_else(|_| ApiFault::new("", body.trim()));
        return Err(ControlError::from_fault(status, fault));
    }
    Ok(body)
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ControlError> {
    serde_json::from_str(body).map_err(|e| ControlError::Serialization(e.to_string()))
}

impl ControlPlane for HttpControlPlane {
    fn get_role(&self, name: &RoleName) -> Result<TrustRole, ControlError> {
        decode(&self.do_get(&format!("/roles/{}", encode_component(name.as_str())))?)
    }

    fn create_role(&self, request: &RoleRequest) -> Result<TrustRole, ControlError> {
        decode(&self.do_post("/roles", request)?)
    }

    fn attach_role_policy(&self, name: &RoleName, policy_arn: &str) -> Result<(), ControlError> {
        let payload = serde_json::json!({ "policy_arn": policy_arn });
        self.do_post(&format!("/roles/{}/policies", encode_component(name.as_str())), &payload)?;
        Ok(())
    }

    fn create_cluster(&self, spec: &ClusterSpec) -> Result<ClusterDescriptor, ControlError> {
        decode(&self.do_post("/clusters", spec)?)
    }

    fn describe_cluster(&self, id: &ClusterId) -> Result<ClusterDescriptor, ControlError> {
        decode(&self.do_get(&format!("/clusters/{}", encode_component(id.as_str())))?)
    }

    fn delete_cluster(
        &self,
        id: &ClusterId,
        request: &DeleteRequest,
    ) -> Result<ClusterDescriptor, ControlError> {
        let mut path = format!(
            "/clusters/{}?skip_final_snapshot={}",
            encode_component(id.as_str()),
            request.skip_final_snapshot
        );
        if let Some(ref snapshot) = request.final_snapshot_identifier {
            path.push_str("&final_snapshot_identifier=");
            path.push_str(&encode_component(snapshot));
        }
        decode(&self.do_delete(&path)?)
    }

    fn list_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroup>, ControlError> {
        decode(&self.do_get(&format!("/vpcs/{}/security-groups", encode_component(vpc_id)))?)
    }

    fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<(), ControlError> {
        self.do_post(&format!("/security-groups/{}/ingress", encode_component(group_id)), rule)?;
        Ok(())
    }
}
