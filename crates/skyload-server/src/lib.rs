//! Reference emulator for the skyload control-plane protocol v1.
//!
//! Serves the role, cluster, and security-group routes from in-memory state
//! so the CLI can be exercised end to end without a cloud account. Clusters
//! report `creating` for a configurable number of describes before turning
//! `available`, and `deleting` for a configurable number of describes before
//! disappearing.
//!
//! The [`TestServer`] helper starts an emulator on a random port for
//! integration testing.

use serde::Serialize;
use skyload_config::{ClusterId, ClusterType, RoleArn, RoleName};
use skyload_control::{
    ApiFault, ClusterDescriptor, ClusterSpec, ClusterStatus, Endpoint, IngressRule, RoleRequest,
    SecurityGroup, TrustRole,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info};

pub const EMULATED_VPC_ID: &str = "vpc-emulated";
pub const EMULATED_GROUP_ID: &str = "sg-emulated";
pub const EMULATED_ACCOUNT: &str = "000000000000";

#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    /// Describes that report `creating` before the cluster turns `available`.
    pub creating_polls: u32,
    /// Describes that report `deleting` before the cluster disappears.
    pub deleting_polls: u32,
    /// Describes that fail with `ServiceUnavailable` before any succeeds.
    pub transient_describes: u32,
    /// Address published as the endpoint of available clusters.
    pub endpoint_address: String,
    /// When set, every request but `/health` must carry this key pair.
    pub credentials: Option<(String, String)>,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            creating_polls: 2,
            deleting_polls: 2,
            transient_describes: 0,
            endpoint_address: "127.0.0.1".to_owned(),
            credentials: None,
        }
    }
}

/// A status code and JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn json(status: u16, value: &impl Serialize) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::fault(500, "InternalFailure", &e.to_string()),
        }
    }

    fn ok(value: &impl Serialize) -> Self {
        Self::json(200, value)
    }

    fn empty() -> Self {
        Self {
            status: 200,
            body: "{}".to_owned(),
        }
    }

    fn fault(status: u16, code: &str, message: &str) -> Self {
        Self::json(status, &ApiFault::new(code, message))
    }
}

struct ClusterRecord {
    descriptor: ClusterDescriptor,
    port: u16,
    polls_left: u32,
}

#[derive(Default)]
struct State {
    roles: HashMap<RoleName, TrustRole>,
    policies: HashMap<RoleName, Vec<String>>,
    clusters: HashMap<ClusterId, ClusterRecord>,
    ingress: HashMap<String, HashSet<IngressRule>>,
    transient_left: u32,
    requests: usize,
}

/// In-memory control plane.
pub struct Emulator {
    options: EmulatorOptions,
    state: Mutex<State>,
}

impl Emulator {
    pub fn new(options: EmulatorOptions) -> Self {
        let state = State {
            transient_left: options.transient_describes,
            ..State::default()
        };
        Self {
            options,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn cluster(&self, id: &str) -> Option<ClusterDescriptor> {
        self.lock()
            .clusters
            .get(&ClusterId::new(id))
            .map(|r| r.descriptor.clone())
    }

    pub fn attached_policies(&self, role: &str) -> Vec<String> {
        self.lock()
            .policies
            .get(&RoleName::new(role))
            .cloned()
            .unwrap_or_default()
    }

    pub fn ingress_rules(&self, group_id: &str) -> Vec<IngressRule> {
        self.lock()
            .ingress
            .get(group_id)
            .map(|rules| rules.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    fn authorized(&self, authorization: Option<&str>) -> bool {
        match self.options.credentials {
            None => true,
            Some((ref key, ref secret)) => {
                authorization == Some(format!("Bearer {key}:{secret}").as_str())
            }
        }
    }

    /// Route one request. `url` may carry a query string.
    pub fn dispatch(
        &self,
        method: &Method,
        url: &str,
        authorization: Option<&str>,
        body: &str,
    ) -> Reply {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        if *method == Method::Get && segments == ["health"] {
            return Reply::ok(&serde_json::json!({ "status": "ok" }));
        }
        self.lock().requests += 1;
        if !self.authorized(authorization) {
            return Reply::fault(
                403,
                "InvalidClientTokenId",
                "The security token included in the request is invalid.",
            );
        }

        match (method, segments.as_slice()) {
            (Method::Get, ["roles", name]) => self.get_role(name),
            (Method::Post, ["roles"]) => match serde_json::from_str(body) {
                Ok(request) => self.create_role(&request),
                Err(e) => malformed(&e),
            },
            (Method::Post, ["roles", name, "policies"]) => {
                match serde_json::from_str::<serde_json::Value>(body) {
                    Ok(v) => match v.get("policy_arn").and_then(serde_json::Value::as_str) {
                        Some(arn) => self.attach_policy(name, arn),
                        None => Reply::fault(400, "MissingParameter", "policy_arn is required"),
                    },
                    Err(e) => malformed(&e),
                }
            }
            (Method::Post, ["clusters"]) => match serde_json::from_str(body) {
                Ok(spec) => self.create_cluster(&spec),
                Err(e) => malformed(&e),
            },
            (Method::Get, ["clusters", id]) => self.describe_cluster(id),
            (Method::Delete, ["clusters", id]) => self.delete_cluster(id, query),
            (Method::Get, ["vpcs", vpc, "security-groups"]) => list_groups(vpc),
            (Method::Post, ["security-groups", group, "ingress"]) => {
                match serde_json::from_str(body) {
                    Ok(rule) => self.authorize_ingress(group, rule),
                    Err(e) => malformed(&e),
                }
            }
            _ => Reply::fault(404, "UnknownOperation", &format!("{method} {path}")),
        }
    }

    fn get_role(&self, name: &str) -> Reply {
        match self.lock().roles.get(&RoleName::new(name)) {
            Some(role) => Reply::ok(role),
            None => no_such_role(name),
        }
    }

    fn create_role(&self, request: &RoleRequest) -> Reply {
        let mut state = self.lock();
        if state.roles.contains_key(&request.role_name) {
            return Reply::fault(
                409,
                "EntityAlreadyExists",
                &format!("Role with name {} already exists.", request.role_name),
            );
        }
        let role = TrustRole {
            role_name: request.role_name.clone(),
            arn: RoleArn::new(format!(
                "arn:aws:iam::{EMULATED_ACCOUNT}:role/{}",
                request.role_name
            )),
        };
        info!("created role {}", role.arn);
        state.roles.insert(role.role_name.clone(), role.clone());
        Reply::ok(&role)
    }

    fn attach_policy(&self, name: &str, policy_arn: &str) -> Reply {
        let mut state = self.lock();
        let name = RoleName::new(name);
        if !state.roles.contains_key(&name) {
            return no_such_role(&name);
        }
        let attached = state.policies.entry(name.clone()).or_default();
        if !attached.iter().any(|p| p == policy_arn) {
            attached.push(policy_arn.to_owned());
        }
        info!("attached {policy_arn} to {name}");
        Reply::empty()
    }

    fn create_cluster(&self, spec: &ClusterSpec) -> Reply {
        match (spec.cluster_type, spec.number_of_nodes) {
            (ClusterType::MultiNode, Some(2..)) | (ClusterType::SingleNode, None) => {}
            (cluster_type, nodes) => {
                return Reply::fault(
                    400,
                    "InvalidParameterCombination",
                    &format!("{cluster_type} clusters cannot have number_of_nodes {nodes:?}"),
                );
            }
        }

        let mut state = self.lock();
        if state.clusters.contains_key(&spec.cluster_identifier) {
            return Reply::fault(
                400,
                "ClusterAlreadyExists",
                &format!("Cluster {} already exists.", spec.cluster_identifier),
            );
        }
        let descriptor = ClusterDescriptor {
            cluster_identifier: spec.cluster_identifier.clone(),
            node_type: spec.node_type.clone(),
            number_of_nodes: spec.number_of_nodes.unwrap_or(1),
            cluster_status: ClusterStatus::Creating.as_str().to_owned(),
            master_username: spec.master_username.clone(),
            db_name: spec.db_name.clone(),
            endpoint: None,
            vpc_id: Some(EMULATED_VPC_ID.to_owned()),
            iam_roles: spec.iam_roles.clone(),
            cluster_create_time: Some(chrono::Utc::now().to_rfc3339()),
        };
        info!("creating cluster {}", spec.cluster_identifier);
        state.clusters.insert(
            spec.cluster_identifier.clone(),
            ClusterRecord {
                descriptor: descriptor.clone(),
                port: spec.port,
                polls_left: self.options.creating_polls,
            },
        );
        Reply::ok(&descriptor)
    }

    fn describe_cluster(&self, id: &str) -> Reply {
        let mut state = self.lock();
        if state.transient_left > 0 {
            state.transient_left -= 1;
            return Reply::fault(503, "ServiceUnavailable", "Service is temporarily unavailable");
        }
        let id = ClusterId::new(id);
        let Some(record) = state.clusters.get_mut(&id) else {
            return cluster_not_found(&id);
        };
        match record.descriptor.status() {
            ClusterStatus::Creating if record.polls_left == 0 => {
                record.descriptor.cluster_status = ClusterStatus::Available.as_str().to_owned();
                record.descriptor.endpoint = Some(Endpoint {
                    address: self.options.endpoint_address.clone(),
                    port: record.port,
                });
                info!("cluster {id} is now available");
            }
            ClusterStatus::Deleting if record.polls_left == 0 => {
                state.clusters.remove(&id);
                info!("cluster {id} deleted");
                return cluster_not_found(&id);
            }
            ClusterStatus::Creating | ClusterStatus::Deleting => record.polls_left -= 1,
            _ => {}
        }
        Reply::ok(&record.descriptor)
    }

    fn delete_cluster(&self, id: &str, query: &str) -> Reply {
        let params = parse_query(query);
        let skip = params.get("skip_final_snapshot").copied() != Some("false");
        let snapshot = params.get("final_snapshot_identifier");
        if !skip && snapshot.is_none() {
            return Reply::fault(
                400,
                "InvalidParameterCombination",
                "final_snapshot_identifier is required unless skip_final_snapshot is true",
            );
        }

        let mut state = self.lock();
        let id = ClusterId::new(id);
        let Some(record) = state.clusters.get_mut(&id) else {
            return cluster_not_found(&id);
        };
        if record.descriptor.status() == ClusterStatus::Deleting {
            return Reply::fault(
                400,
                "InvalidClusterState",
                &format!("Cluster {id} is already being deleted."),
            );
        }
        record.descriptor.cluster_status = ClusterStatus::Deleting.as_str().to_owned();
        record.polls_left = self.options.deleting_polls;
        if let Some(snapshot) = snapshot {
            info!("deleting cluster {id} with final snapshot {snapshot}");
        } else {
            info!("deleting cluster {id}");
        }
        Reply::ok(&record.descriptor)
    }

    fn authorize_ingress(&self, group_id: &str, rule: IngressRule) -> Reply {
        if group_id != EMULATED_GROUP_ID {
            return Reply::fault(
                404,
                "InvalidGroup.NotFound",
                &format!("The security group '{group_id}' does not exist"),
            );
        }
        let mut state = self.lock();
        let rules = state.ingress.entry(group_id.to_owned()).or_default();
        if rules.contains(&rule) {
            return Reply::fault(
                400,
                "InvalidPermission.Duplicate",
                &format!(
                    "the specified rule \"peer: {}, {}, from port: {}, to port: {}, ALLOW\" already exists",
                    rule.cidr_ip, rule.ip_protocol, rule.from_port, rule.to_port
                ),
            );
        }
        info!(
            "authorized {}/{} from {} on {group_id}",
            rule.ip_protocol, rule.from_port, rule.cidr_ip
        );
        rules.insert(rule);
        Reply::empty()
    }
}

fn malformed(err: &serde_json::Error) -> Reply {
    Reply::fault(400, "MalformedInput", &err.to_string())
}

fn no_such_role(name: &str) -> Reply {
    Reply::fault(
        404,
        "NoSuchEntity",
        &format!("The role with name {name} cannot be found."),
    )
}

fn cluster_not_found(id: &ClusterId) -> Reply {
    Reply::fault(404, "ClusterNotFound", &format!("Cluster {id} not found."))
}

fn list_groups(vpc_id: &str) -> Reply {
    if vpc_id != EMULATED_VPC_ID {
        return Reply::fault(
            404,
            "InvalidVpcID.NotFound",
            &format!("The vpc ID '{vpc_id}' does not exist"),
        );
    }
    Reply::ok(&vec![SecurityGroup {
        group_id: EMULATED_GROUP_ID.to_owned(),
        group_name: "default".to_owned(),
        vpc_id: vpc_id.to_owned(),
    }])
}

fn parse_query(query: &str) -> HashMap<&str, &str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect()
}

fn read_body(req: &mut tiny_http::Request) -> Option<String> {
    let mut body = String::new();
    if req.as_reader().read_to_string(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

/// Handle a single HTTP request.
pub fn handle_request(emulator: &Emulator, mut req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    let authorization = req
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str().to_owned());
    let reply = match read_body(&mut req) {
        Some(body) => emulator.dispatch(&method, &url, authorization.as_deref(), &body),
        None => Reply::fault(400, "MalformedInput", "request body is not UTF-8"),
    };

    let mut response = Response::from_string(reply.body).with_status_code(StatusCode(reply.status));
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

/// Serve requests on `addr`, blocking the current thread.
pub fn run_server(
    emulator: &Arc<Emulator>,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = Server::http(addr)?;
    for request in server.incoming_requests() {
        handle_request(emulator, request);
    }
    Ok(())
}

/// An emulator on a random port in a background thread.
///
/// Dropping the `TestServer` stops the server.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub emulator: Arc<Emulator>,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(EmulatorOptions::default())
    }

    pub fn start_with(options: EmulatorOptions) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let emulator = Arc::new(Emulator::new(options));
        let srv = Arc::clone(&server);
        let emu = Arc::clone(&emulator);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&emu, request);
            }
        });

        Self {
            url,
            port,
            emulator,
            server,
            handle: Some(handle),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_body(id: &str) -> String {
        serde_json::json!({
            "cluster_identifier": id,
            "cluster_type": "multi-node",
            "node_type": "dc2.large",
            "number_of_nodes": 4,
            "db_name": "dwh",
            "master_username": "dwhuser",
            "master_user_password": "Passw0rd",
            "port": 5439,
            "iam_roles": [],
            "publicly_accessible": true
        })
        .to_string()
    }

    fn status_of(reply: &Reply) -> String {
        let v: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        v["cluster_status"].as_str().unwrap_or_default().to_owned()
    }

    fn code_of(reply: &Reply) -> String {
        let fault: ApiFault = serde_json::from_str(&reply.body).unwrap();
        fault.code
    }

    #[test]
    fn cluster_turns_available_after_creating_polls() {
        let emu = Emulator::new(EmulatorOptions::default());
        let created = emu.dispatch(&Method::Post, "/clusters", None, &spec_body("c1"));
        assert_eq!(created.status, 200);
        assert_eq!(status_of(&created), "creating");

        for _ in 0..2 {
            let r = emu.dispatch(&Method::Get, "/clusters/c1", None, "");
            assert_eq!(status_of(&r), "creating");
        }
        let r = emu.dispatch(&Method::Get, "/clusters/c1", None, "");
        assert_eq!(status_of(&r), "available");
        let d: ClusterDescriptor = serde_json::from_str(&r.body).unwrap();
        assert_eq!(
            d.endpoint,
            Some(Endpoint {
                address: "127.0.0.1".to_owned(),
                port: 5439
            })
        );
    }

    #[test]
    fn deleted_cluster_disappears_after_deleting_polls() {
        let emu = Emulator::new(EmulatorOptions {
            creating_polls: 0,
            deleting_polls: 1,
            ..EmulatorOptions::default()
        });
        emu.dispatch(&Method::Post, "/clusters", None, &spec_body("c1"));
        let r = emu.dispatch(
            &Method::Delete,
            "/clusters/c1?skip_final_snapshot=true",
            None,
            "",
        );
        assert_eq!(status_of(&r), "deleting");

        let again = emu.dispatch(&Method::Delete, "/clusters/c1", None, "");
        assert_eq!(again.status, 400);
        assert_eq!(code_of(&again), "InvalidClusterState");

        let r = emu.dispatch(&Method::Get, "/clusters/c1", None, "");
        assert_eq!(status_of(&r), "deleting");
        let r = emu.dispatch(&Method::Get, "/clusters/c1", None, "");
        assert_eq!(r.status, 404);
        assert_eq!(code_of(&r), "ClusterNotFound");
        assert!(emu.cluster("c1").is_none());
    }

    #[test]
    fn final_snapshot_needs_identifier() {
        let emu = Emulator::new(EmulatorOptions::default());
        emu.dispatch(&Method::Post, "/clusters", None, &spec_body("c1"));
        let r = emu.dispatch(
            &Method::Delete,
            "/clusters/c1?skip_final_snapshot=false",
            None,
            "",
        );
        assert_eq!(r.status, 400);
        let r = emu.dispatch(
            &Method::Delete,
            "/clusters/c1?skip_final_snapshot=false&final_snapshot_identifier=snap-1",
            None,
            "",
        );
        assert_eq!(r.status, 200);
    }

    #[test]
    fn duplicate_cluster_and_bad_node_count_are_rejected() {
        let emu = Emulator::new(EmulatorOptions::default());
        emu.dispatch(&Method::Post, "/clusters", None, &spec_body("c1"));
        let dup = emu.dispatch(&Method::Post, "/clusters", None, &spec_body("c1"));
        assert_eq!(code_of(&dup), "ClusterAlreadyExists");

        let mut single: serde_json::Value = serde_json::from_str(&spec_body("c2")).unwrap();
        single["cluster_type"] = "single-node".into();
        let bad = emu.dispatch(&Method::Post, "/clusters", None, &single.to_string());
        assert_eq!(bad.status, 400);
        assert_eq!(code_of(&bad), "InvalidParameterCombination");
    }

    #[test]
    fn duplicate_ingress_is_reported() {
        let emu = Emulator::new(EmulatorOptions::default());
        let rule = serde_json::to_string(&IngressRule::tcp_from_anywhere(5439)).unwrap();
        let url = format!("/security-groups/{EMULATED_GROUP_ID}/ingress");
        assert_eq!(emu.dispatch(&Method::Post, &url, None, &rule).status, 200);
        let dup = emu.dispatch(&Method::Post, &url, None, &rule);
        assert_eq!(dup.status, 400);
        assert_eq!(code_of(&dup), "InvalidPermission.Duplicate");
        assert_eq!(emu.ingress_rules(EMULATED_GROUP_ID).len(), 1);

        let missing = emu.dispatch(&Method::Post, "/security-groups/sg-x/ingress", None, &rule);
        assert_eq!(code_of(&missing), "InvalidGroup.NotFound");
    }

    #[test]
    fn role_lifecycle() {
        let emu = Emulator::new(EmulatorOptions::default());
        let missing = emu.dispatch(&Method::Get, "/roles/dwhRole", None, "");
        assert_eq!(code_of(&missing), "NoSuchEntity");

        let body = serde_json::to_string(&skyload_control::policy::role_request(&RoleName::new(
            "dwhRole",
        )))
        .unwrap();
        assert_eq!(emu.dispatch(&Method::Post, "/roles", None, &body).status, 200);
        let dup = emu.dispatch(&Method::Post, "/roles", None, &body);
        assert_eq!(dup.status, 409);

        let attach = serde_json::json!({ "policy_arn": "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess" });
        let r = emu.dispatch(
            &Method::Post,
            "/roles/dwhRole/policies",
            None,
            &attach.to_string(),
        );
        assert_eq!(r.status, 200);
        assert_eq!(emu.attached_policies("dwhRole").len(), 1);
    }

    #[test]
    fn transient_describes_fail_first() {
        let emu = Emulator::new(EmulatorOptions {
            transient_describes: 1,
            ..EmulatorOptions::default()
        });
        let r = emu.dispatch(&Method::Get, "/clusters/c1", None, "");
        assert_eq!(r.status, 503);
        let r = emu.dispatch(&Method::Get, "/clusters/c1", None, "");
        assert_eq!(r.status, 404);
    }

    #[test]
    fn credentials_are_enforced_except_for_health() {
        let emu = Emulator::new(EmulatorOptions {
            credentials: Some(("AKIA".to_owned(), "s3cret".to_owned())),
            ..EmulatorOptions::default()
        });
        assert_eq!(emu.dispatch(&Method::Get, "/health", None, "").status, 200);
        let denied = emu.dispatch(&Method::Get, "/roles/r", None, "");
        assert_eq!(denied.status, 403);
        let allowed = emu.dispatch(&Method::Get, "/roles/r", Some("Bearer AKIA:s3cret"), "");
        assert_eq!(allowed.status, 404);
        assert_eq!(emu.request_count(), 2);
    }

    #[test]
    fn unknown_route() {
        let emu = Emulator::new(EmulatorOptions::default());
        let r = emu.dispatch(&Method::Put, "/clusters/c1", None, "");
        assert_eq!(code_of(&r), "UnknownOperation");
    }
}
