//! Fixed trust and permission documents for the warehouse service role.

use crate::model::RoleRequest;
use skyload_config::RoleName;

/// Managed policy granting read-only access to the external object store.
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Service principal allowed to assume the role.
pub const WAREHOUSE_SERVICE_PRINCIPAL: &str = "redshift.amazonaws.com";

pub const ROLE_DESCRIPTION: &str = "Allows Redshift clusters to call AWS services on your behalf.";

/// Trust policy letting the warehouse service assume the role.
pub fn trust_policy_document() -> serde_json::Value {
    serde_json::json!({
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": WAREHOUSE_SERVICE_PRINCIPAL }
        }],
        "Version": "2012-10-17"
    })
}

pub fn role_request(name: &RoleName) -> RoleRequest {
    RoleRequest {
        role_name: name.clone(),
        path: "/".to_owned(),
        description: ROLE_DESCRIPTION.to_owned(),
        assume_role_policy_document: trust_policy_document().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_policy_names_warehouse_principal() {
        let doc = trust_policy_document();
        assert_eq!(doc["Statement"][0]["Action"], "sts:AssumeRole");
        assert_eq!(
            doc["Statement"][0]["Principal"]["Service"],
            WAREHOUSE_SERVICE_PRINCIPAL
        );
    }

    #[test]
    fn role_request_embeds_policy_as_json_string() {
        let req = role_request(&RoleName::new("dwhRole"));
        assert_eq!(req.path, "/");
        let parsed: serde_json::Value =
            serde_json::from_str(&req.assume_role_policy_document).unwrap();
        assert_eq!(parsed, trust_policy_document());
    }
}
