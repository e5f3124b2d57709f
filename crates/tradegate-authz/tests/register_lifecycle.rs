//! Registration and deletion flows against a mock authority.

use serde_json::json;
use tradegate_authority::{AuthorityClient, AuthoritySettings};
use tradegate_authz::{AuthzService, Contract, RuleAttributes};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESOURCE_URL: &str = "https://data.example.org/set/1";
const CANONICAL: &str = "https%3A%2F%2Fdata.example.org%2Fset%2F1";
const RS: &str = "/admin/realms/dataspace/clients/cuuid/authz/resource-server";

fn service_for(server: &MockServer) -> AuthzService {
    let settings = AuthoritySettings::new(
        Url::parse(&server.uri()).unwrap(),
        "dataspace",
        "provider-connector",
        "connector-secret",
    )
    .with_admin_credentials("admin", "admin-password")
    .with_allow_http(true);
    AuthzService::new(AuthorityClient::new(settings).unwrap())
}

/// Admin token plus client lookup, the prefix of every management flow.
async fn mount_admin_prelude(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/realms/master/protocol/openid-connect/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_token": "admin-token"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/realms/dataspace/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "cuuid", "clientId": "provider-connector"},
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn register_creates_the_full_object_chain_for_a_new_rule() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/resource")))
        .and(query_param("uri", CANONICAL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{RS}/resource")))
        .and(body_string_contains(CANONICAL))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"_id": "res-1", "name": CANONICAL})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/regex")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{RS}/policy/regex")))
        .and(body_string_contains("user|alice"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "pol-user", "name": "user|alice"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{RS}/policy/regex")))
        .and(body_string_contains("aal|2"))
        .and(body_string_contains("[23]"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "pol-aal", "name": "aal|2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/aggregate")))
        .and(query_param("name", "user|alice|org|None|aal|2#trade-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{RS}/policy/aggregate")))
        .and(body_string_contains("pol-user"))
        .and(body_string_contains("pol-aal"))
        .and(body_string_contains("trade-1,https://contracts.example.org/1,file"))
        .respond_with(ResponseTemplate::new(201).set_body_json(
            json!({"id": "agg-1", "name": "user|alice|org|None|aal|2#trade-1"}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .and(query_param("name", CANONICAL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{RS}/permission")))
        .and(body_string_contains("agg-1"))
        .and(body_string_contains("res-1"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "perm-1", "name": CANONICAL})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let attrs = RuleAttributes::new().with_user("alice").with_aal(2);
    let contract = Contract {
        trade_id: "trade-1".to_string(),
        contract_url: "https://contracts.example.org/1".to_string(),
        contract_type: "file".to_string(),
    };
    let reply = service_for(&server)
        .register(RESOURCE_URL, &attrs, Some(&contract))
        .await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content, json!({"message": "success"}));
}

#[tokio::test]
async fn register_extends_an_existing_permission_with_a_new_rule() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/resource")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"_id": "res-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;

    // The atomic policy already exists from an earlier rule; among the
    // substring hits only the exact name counts.
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/regex")))
        .and(query_param("name", "user|bob"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "pol-bobby", "name": "user|bobby", "type": "regex"},
            {"id": "pol-bob", "name": "user|bob", "type": "regex"},
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/aggregate")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{RS}/policy/aggregate")))
        .and(body_string_contains("pol-bob"))
        .respond_with(ResponseTemplate::new(201).set_body_json(
            json!({"id": "agg-2", "name": "user|bob|org|None|aal|None"}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "perm-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|2#trade-1"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{RS}/permission/resource/perm-1")))
        .and(body_string_contains("agg-1"))
        .and(body_string_contains("agg-2"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = RuleAttributes::new().with_user("bob");
    let reply = service_for(&server).register(RESOURCE_URL, &attrs, None).await;
    assert_eq!(reply.status, 200);
}

#[tokio::test]
async fn register_is_idempotent_for_an_existing_rule() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/resource")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"_id": "res-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/regex")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "pol-user", "name": "user|alice", "type": "regex"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/aggregate")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|None"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "perm-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|None"},
        ])))
        .mount(&server)
        .await;

    // No policy or permission creation mock is mounted: any attempt to
    // create would hit an unmatched route and fail the flow.
    Mock::given(method("PUT"))
        .and(path(format!("{RS}/permission/resource/perm-1")))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = RuleAttributes::new().with_user("alice");
    let reply = service_for(&server).register(RESOURCE_URL, &attrs, None).await;
    assert_eq!(reply.status, 200);
}

#[tokio::test]
async fn register_rejects_an_invalid_assurance_level_before_any_call() {
    let server = MockServer::start().await;

    let attrs = RuleAttributes::new().with_aal(7);
    let reply = service_for(&server).register(RESOURCE_URL, &attrs, None).await;

    assert_eq!(reply.status, 400);
    assert_eq!(
        reply.content["message"],
        json!("specify aal between 1 and 3")
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_by_trade_id_detaches_the_rule_and_keeps_shared_atomics() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "perm-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/perm-1/resources")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"_id": "res-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|2#trade-1"},
            {"id": "agg-2", "name": "user|bob|org|None|aal|None"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{RS}/permission/resource/perm-1")))
        .and(body_string_contains("agg-2"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    // Sweep of the detached aggregate: nothing references it anymore, its
    // member is still shared with agg-2 and must survive.
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/agg-1/dependentPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/agg-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "pol-user", "name": "user|alice"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{RS}/policy/agg-1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/pol-user/dependentPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-other", "name": "user|alice|org|None|aal|3"},
        ])))
        .mount(&server)
        .await;

    let reply = service_for(&server)
        .delete_by_trade_id(RESOURCE_URL, "trade-1")
        .await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content, json!({"message": "success"}));
}

#[tokio::test]
async fn deleting_the_last_rule_removes_the_resource_and_all_policies() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "perm-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/perm-1/resources")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"_id": "res-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|None"},
        ])))
        .mount(&server)
        .await;

    // The empty permission goes away with its resource.
    Mock::given(method("DELETE"))
        .and(path(format!("{RS}/resource/res-1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/agg-1/dependentPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/agg-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "pol-user", "name": "user|alice"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{RS}/policy/agg-1")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/pol-user/dependentPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{RS}/policy/pol-user")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = RuleAttributes::new().with_user("alice");
    let reply = service_for(&server)
        .delete_by_attributes(RESOURCE_URL, &attrs)
        .await;
    assert_eq!(reply.status, 200);
}

#[tokio::test]
async fn delete_keeps_an_aggregate_still_referenced_by_another_permission() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "perm-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/perm-1/resources")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"_id": "res-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|2#trade-1"},
            {"id": "agg-2", "name": "user|bob|org|None|aal|None"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{RS}/permission/resource/perm-1")))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    // The same signature was registered for a second resource, so the
    // detached aggregate still has a dependent permission there.
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/agg-1/dependentPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "perm-2", "name": "https%3A%2F%2Fdata.example.org%2Fset%2F2"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let reply = service_for(&server)
        .delete_by_trade_id(RESOURCE_URL, "trade-1")
        .await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content, json!({"message": "success"}));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() != "DELETE"));
}

#[tokio::test]
async fn delete_succeeds_even_when_the_cleanup_sweep_fails() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "perm-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/perm-1/resources")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"_id": "res-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|2#trade-1"},
            {"id": "agg-2", "name": "user|bob|org|None|aal|None"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{RS}/permission/resource/perm-1")))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    // The sweep's very first read fails; the rule is already detached at
    // this point and the caller must still see success.
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/agg-1/dependentPolicies")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let reply = service_for(&server)
        .delete_by_trade_id(RESOURCE_URL, "trade-1")
        .await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content, json!({"message": "success"}));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() != "DELETE"));
}

#[tokio::test]
async fn delete_reports_a_rule_that_is_not_attached() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "perm-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/perm-1/resources")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"_id": "res-1", "name": CANONICAL}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|None"},
        ])))
        .mount(&server)
        .await;

    let reply = service_for(&server)
        .delete_by_trade_id(RESOURCE_URL, "trade-9")
        .await;
    assert_eq!(reply.status, 404);
    assert_eq!(reply.content["message"], json!("not found policy in permission"));
}

#[tokio::test]
async fn delete_reports_an_unknown_resource_url() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission/resource")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let attrs = RuleAttributes::new().with_user("alice");
    let reply = service_for(&server)
        .delete_by_attributes(RESOURCE_URL, &attrs)
        .await;
    assert_eq!(reply.status, 404);
    assert_eq!(reply.content["message"], json!("not found permission"));
}

#[tokio::test]
async fn listing_skips_the_builtin_default_permission() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "perm-default", "name": "Default Permission"},
            {"id": "perm-1", "name": CANONICAL},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "agg-1",
                "name": "user|alice|org|None|aal|2#trade-1",
                "description": "trade-1,https://contracts.example.org/1,file, 20260101000000000000",
            },
            {"id": "agg-2", "name": "user|None|org|example.org|aal|None", "description": ",,, 20260201000000000000"},
        ])))
        .mount(&server)
        .await;

    let reply = service_for(&server).get_authorization_list().await;
    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.content,
        json!([
            {
                "permission": {
                    "assignee": {"user": "alice", "aal": 2},
                    "target": RESOURCE_URL,
                    "assigner": "dataspace",
                },
                "contract": {
                    "trade_id": "trade-1",
                    "contract_url": "https://contracts.example.org/1",
                    "contract_type": "file",
                },
            },
            {
                "permission": {
                    "assignee": {"org": "example.org"},
                    "target": RESOURCE_URL,
                    "assigner": "dataspace",
                },
            },
        ])
    );
}

#[tokio::test]
async fn listing_one_resource_filters_by_permission_name() {
    let server = MockServer::start().await;
    mount_admin_prelude(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{RS}/permission")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "perm-1", "name": CANONICAL},
            {"id": "perm-2", "name": "https%3A%2F%2Fdata.example.org%2Fset%2F2"},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{RS}/policy/perm-1/associatedPolicies")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "agg-1", "name": "user|alice|org|None|aal|None", "description": ",,, 20260101000000000000"},
        ])))
        .mount(&server)
        .await;

    let reply = service_for(&server).get_authorization(RESOURCE_URL).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content.as_array().map(Vec::len), Some(1));
    assert_eq!(reply.content[0]["permission"]["target"], json!(RESOURCE_URL));
}
