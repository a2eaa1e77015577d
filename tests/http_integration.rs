//! Integration tests for the resource lifecycle using wiremock
//!
//! These tests run the real clients against mocked endpoints and verify the
//! lifecycle semantics: created resources adopt the server-assigned id, reads
//! of vanished resources are not errors, deletes are idempotent and retry
//! through 409s, and updates only submit changed fields.
//!
//! Wait-heavy tests run with paused tokio time so the fixed 5s/3s polling
//! intervals elapse instantly.

use hwstage::huawei::auth::Credentials;
use hwstage::huawei::client::{CceClient, KubeClient, ServiceStageClient};
use hwstage::resource::wait::{DEFAULT_CREATE_TIMEOUT, DEFAULT_DELETE_TIMEOUT};
use hwstage::resource::{application, cluster, component, instance, service};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn servicestage(server: &MockServer) -> ServiceStageClient {
    let credentials = Credentials::with_token("test-token").unwrap();
    ServiceStageClient::with_endpoint(credentials, "cn-north-4", "p1", &server.uri()).unwrap()
}

fn kube(server: &MockServer) -> KubeClient {
    let credentials = Credentials::with_token("test-token").unwrap();
    KubeClient::with_endpoint(credentials, &server.uri()).unwrap()
}

fn cce(server: &MockServer) -> CceClient {
    let credentials = Credentials::with_token("test-token").unwrap();
    CceClient::with_endpoint(credentials, "cn-north-4", "p1", &server.uri()).unwrap()
}

mod application_lifecycle {
    use super::*;

    /// Creating with only a name posts `{"name":"demo"}` and adopts the
    /// server-assigned id
    #[tokio::test(start_paused = true)]
    async fn create_adopts_server_assigned_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/p1/cas/applications"))
            .and(header("X-Auth-Token", "test-token"))
            .and(body_json(json!({ "name": "demo" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "abc123", "name": "demo" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "abc123", "name": "demo" })),
            )
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let spec = application::ApplicationSpec {
            name: "demo".to_string(),
            description: None,
            enterprise_project_id: None,
        };

        let created = application::create(&client, &spec, DEFAULT_CREATE_TIMEOUT)
            .await
            .expect("create should succeed");
        assert_eq!(created.id, "abc123");

        // a subsequent read returns the same id
        let read = application::get(&client, &created.id)
            .await
            .expect("read should succeed")
            .expect("application should exist");
        assert_eq!(read.id, "abc123");
    }

    /// A vendor error on create surfaces the message and adopts no id
    #[tokio::test]
    async fn create_surfaces_vendor_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/p1/cas/applications"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "SVCSTG.00100400",
                "error_msg": "invalid application name"
            })))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let spec = application::ApplicationSpec {
            name: "demo".to_string(),
            description: None,
            enterprise_project_id: None,
        };

        let err = application::create(&client, &spec, DEFAULT_CREATE_TIMEOUT)
            .await
            .expect_err("create should fail");
        assert!(err.to_string().contains("invalid application name"));
    }

    /// Reading a non-existent id clears local state without raising an error
    #[tokio::test]
    async fn read_of_missing_resource_is_none_not_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_code": "SVCSTG.00100404",
                "error_msg": "application not found"
            })))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let read = application::get(&client, "gone").await.expect("404 is not an error");
        assert!(read.is_none());
    }

    /// Deleting an already-absent resource reports deleted without error,
    /// twice in a row
    #[tokio::test(start_paused = true)]
    async fn delete_is_idempotent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        application::delete(&client, "gone", DEFAULT_DELETE_TIMEOUT)
            .await
            .expect("first delete should succeed");
        application::delete(&client, "gone", DEFAULT_DELETE_TIMEOUT)
            .await
            .expect("second delete should succeed");
    }

    /// A 409 from the DELETE call means "still busy": the poll retries and
    /// succeeds once the server stops returning 409
    #[tokio::test]
    async fn delete_retries_through_conflict() {
        let server = MockServer::start().await;
        let body = json!({ "id": "abc123", "name": "demo" });

        // two rounds still see the application, then it is gone
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        // first delete attempt conflicts, second is accepted
        Mock::given(method("DELETE"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error_code": "SVCSTG.00100409",
                "error_msg": "application has components"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = servicestage(&server);
        application::delete(&client, "abc123", DEFAULT_DELETE_TIMEOUT)
            .await
            .expect("delete should eventually succeed");
    }

    /// An empty diff sends no update request at all
    #[tokio::test]
    async fn empty_diff_sends_no_put() {
        let server = MockServer::start().await;
        let body = json!({ "id": "abc123", "name": "demo" });

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let read = application::update(&client, "abc123", &application::ApplicationUpdate::default())
            .await
            .expect("update with no changes should succeed");
        assert_eq!(read.unwrap().id, "abc123");
    }

    /// A partial diff submits exactly the changed fields
    #[tokio::test]
    async fn update_submits_only_changed_fields() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .and(body_json(json!({ "description": "new words" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "abc123", "name": "demo" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "abc123", "name": "demo", "description": "new words" }),
            ))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let spec = application::ApplicationSpec {
            name: "demo".to_string(),
            description: Some("new words".to_string()),
            enterprise_project_id: None,
        };
        let current = application::Application {
            id: "abc123".to_string(),
            name: "demo".to_string(),
            description: Some("old words".to_string()),
        };

        let update = spec.diff(&current);
        let read = application::update(&client, "abc123", &update)
            .await
            .expect("update should succeed");
        assert_eq!(read.unwrap().description.as_deref(), Some("new words"));
    }
}

mod component_lifecycle {
    use super::*;

    /// Component creation polls the numeric status until it reports 0
    #[tokio::test(start_paused = true)]
    async fn create_waits_for_zero_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/p1/cas/applications/app-1/components"))
            .and(body_partial_json(json!({ "name": "web", "runtime": "Docker" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "comp-1", "name": "web", "status": 3 }),
            ))
            .mount(&server)
            .await;

        // still converging on the first poll, settled on the second
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/app-1/components/comp-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "comp-1", "name": "web", "status": 3 }),
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/app-1/components/comp-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "comp-1", "name": "web", "status": 0 }),
            ))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let spec = component::ComponentSpec {
            name: "web".to_string(),
            application_id: "app-1".to_string(),
            runtime: "Docker".to_string(),
            category: "Webapp".to_string(),
            sub_category: None,
            description: None,
            build: Default::default(),
            source: None,
        };

        let created = component::create(&client, &spec, DEFAULT_CREATE_TIMEOUT)
            .await
            .expect("create should succeed");
        assert_eq!(created.id, "comp-1");
        assert_eq!(created.status, 0);
    }

    /// A component that reports status 1 fails the create instead of
    /// polling forever
    #[tokio::test(start_paused = true)]
    async fn failed_status_aborts_create() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/p1/cas/applications/app-1/components"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "comp-1", "name": "web", "status": 3 }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/app-1/components/comp-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "comp-1", "name": "web", "status": 1 }),
            ))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let spec = component::ComponentSpec {
            name: "web".to_string(),
            application_id: "app-1".to_string(),
            runtime: "Docker".to_string(),
            category: "Webapp".to_string(),
            sub_category: None,
            description: None,
            build: Default::default(),
            source: None,
        };

        let err = component::create(&client, &spec, DEFAULT_CREATE_TIMEOUT)
            .await
            .expect_err("create should fail on status 1");
        assert!(err.to_string().contains("FAILED"), "unexpected error: {err}");
    }
}

mod instance_lifecycle {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> instance::InstanceSpec {
        instance::InstanceSpec {
            name: "web-v1".to_string(),
            application_id: "app-1".to_string(),
            component_id: "comp-1".to_string(),
            environment_id: "env-1".to_string(),
            replica: 1,
            flavor_id: "MICRO-5G".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            artifacts: BTreeMap::new(),
            env: vec![instance::EnvVar {
                name: "LOG_LEVEL".to_string(),
                value: "info".to_string(),
            }],
            external_accesses: Vec::new(),
            refer_resources: vec![instance::ReferResource {
                id: "cluster-1".to_string(),
                kind: "cce".to_string(),
                refer_alias: None,
                parameters: BTreeMap::new(),
            }],
        }
    }

    /// The deployment id comes back as `instance_id` and is adopted as the
    /// local id; env vars travel under `configuration.env`
    #[tokio::test(start_paused = true)]
    async fn create_adopts_instance_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/p1/cas/applications/app-1/components/comp-1/instances"))
            .and(body_partial_json(json!({
                "environment_id": "env-1",
                "configuration": { "env": [ { "name": "LOG_LEVEL", "value": "info" } ] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "instance_id": "inst-1", "job_id": "job-9" }),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/p1/cas/applications/app-1/components/comp-1/instances/inst-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "id": "inst-1", "name": "web-v1", "job_id": "job-9" }),
            ))
            .mount(&server)
            .await;

        let client = servicestage(&server);
        let created = instance::create(&client, &spec(), DEFAULT_CREATE_TIMEOUT)
            .await
            .expect("create should succeed");
        assert_eq!(created.id, "inst-1");
        assert_eq!(created.job_id.as_deref(), Some("job-9"));
    }
}

mod service_lifecycle {
    use super::*;

    fn web_service() -> service::Service {
        serde_json::from_value(json!({
            "metadata": { "name": "web" },
            "spec": {
                "ports": [ { "port": 80, "targetPort": 8080 } ],
                "selector": { "app": "web" }
            }
        }))
        .unwrap()
    }

    /// One port with defaults produces the documented k8s spec and the
    /// create expects a 201
    #[tokio::test(start_paused = true)]
    async fn create_posts_kubernetes_object() {
        let server = MockServer::start().await;
        let body = json!({
            "kind": "Service",
            "apiVersion": "v1",
            "metadata": { "name": "web", "namespace": "default" },
            "spec": {
                "ports": [ { "protocol": "TCP", "port": 80, "targetPort": 8080 } ],
                "selector": { "app": "web" },
                "type": "ClusterIP",
                "sessionAffinity": "None"
            }
        });

        Mock::given(method("POST"))
            .and(path("/api/v1/namespaces/default/services"))
            .and(header("X-Auth-Token", "test-token"))
            .and(body_json(&body))
            .respond_with(ResponseTemplate::new(201).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = kube(&server);
        let created = service::create(&client, &web_service(), DEFAULT_CREATE_TIMEOUT)
            .await
            .expect("create should succeed");
        assert_eq!(created.metadata.name, "web");
        assert_eq!(created.spec.ports[0].target_port, Some(8080));
    }

    /// Service delete follows the same poll: conflict retries, 404 finishes
    #[tokio::test]
    async fn delete_retries_through_conflict() {
        let server = MockServer::start().await;
        let body = json!({ "metadata": { "name": "web" }, "spec": {} });

        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/services/web"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/api/v1/namespaces/default/services/web"))
            .respond_with(ResponseTemplate::new(409).set_body_json(
                json!({ "kind": "Status", "message": "operation in progress" }),
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/namespaces/default/services/web"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = kube(&server);
        service::delete(&client, "default", "web", DEFAULT_DELETE_TIMEOUT)
            .await
            .expect("delete should eventually succeed");
    }
}

mod cluster_lookup {
    use super::*;

    #[tokio::test]
    async fn find_selects_by_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/projects/p1/clusters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "metadata": { "uid": "c-1", "name": "staging" },
                        "status": { "phase": "Available" }
                    },
                    {
                        "metadata": { "uid": "c-2", "name": "prod" },
                        "status": { "phase": "Available" }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = cce(&server);
        let query = cluster::ClusterQuery {
            name: Some("prod".to_string()),
            id: None,
        };
        let found = cluster::find(&client, &query)
            .await
            .expect("lookup should succeed")
            .expect("cluster should match");
        assert_eq!(found.id, "c-2");

        let missing = cluster::find(
            &client,
            &cluster::ClusterQuery {
                name: Some("dev".to_string()),
                id: None,
            },
        )
        .await
        .expect("lookup should succeed");
        assert!(missing.is_none());
    }
}
