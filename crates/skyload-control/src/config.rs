use skyload_config::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl ControlConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            region: "us-west-2".to_owned(),
            access_key: None,
            secret_key: None,
        }
    }

    #[must_use]
    pub fn with_keys(mut self, key: &str, secret: &str) -> Self {
        self.access_key = Some(key.to_owned());
        self.secret_key = Some(secret.to_owned());
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut config = Self::new(&settings.aws.endpoint);
        config.region.clone_from(&settings.aws.region);
        if let Some((key, secret)) = settings.access_keys() {
            config = config.with_keys(key, secret);
        }
        config
    }

    pub(crate) fn authorization(&self) -> Option<String> {
        match (&self.access_key, &self.secret_key) {
            (Some(k), Some(s)) => Some(format!("Bearer {k}:{s}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash() {
        let config = ControlConfig::new("http://127.0.0.1:8321/");
        assert_eq!(config.endpoint, "http://127.0.0.1:8321");
    }

    #[test]
    fn authorization_requires_both_keys() {
        let config = ControlConfig::new("http://x");
        assert!(config.authorization().is_none());
        let config = config.with_keys("AKIA", "secret");
        assert_eq!(config.authorization().as_deref(), Some("Bearer AKIA:secret"));
    }

    #[test]
    fn from_settings_copies_region_and_keys() {
        let settings = skyload_config::parse_settings_str(
            r#"
[aws]
key = "AKIA"
secret = "s"
region = "eu-central-1"
endpoint = "http://cp.local/"

[cluster]
cluster_type = "single-node"
node_type = "dc2.large"
identifier = "c1"
db_name = "dwh"
db_user = "u"
db_password = "p"

[iam]
role_name = "r"
"#,
        )
        .unwrap();
        let config = ControlConfig::from_settings(&settings);
        assert_eq!(config.endpoint, "http://cp.local");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.access_key.as_deref(), Some("AKIA"));
    }
}
