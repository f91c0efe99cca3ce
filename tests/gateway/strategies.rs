use std::sync::Arc;
use std::time::Duration;

use authn::identity::{dns1123, EXT_EMAIL, EXT_NAME};
use authn::resolvers::{
    GithubConfigSpec, LdapConfigSpec, MemoryResolver, OAuth2Spec, OAuthConfigSpec, ObjectRef, OidcConfigSpec,
    SnowplowResolver,
};
use authn::session::SessionIssuer;
use authn::strategies::{
    GithubStrategy, LdapStrategy, LoginRequest, LoginStrategy, OAuthStrategy, OidcStrategy, StrategyContext,
};
use http::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{ldap_entry, unsigned_jwt, FakeDirectory, SERVICE_DN};

const NAMESPACE: &str = "krateo-system";

fn context(resolver: MemoryResolver, snowplow_url: &str) -> StrategyContext {
    let resolver = Arc::new(resolver);
    let issuer = SessionIssuer::new(b"service-signing-key", Duration::from_secs(600));
    let rest_actions = Arc::new(SnowplowResolver::new(snowplow_url, "authn", Some(issuer)));
    StrategyContext::new(resolver.clone(), resolver, rest_actions)
}

fn oauth2_spec(server: &MockServer) -> OAuth2Spec {
    OAuth2Spec {
        client_id: "client".into(),
        auth_url: format!("{}/authorize", server.uri()),
        token_url: format!("{}/token", server.uri()),
        redirect_url: "https://krateo.example/auth".into(),
        scopes: vec!["read:user".into()],
        ..Default::default()
    }
}

async fn mount_token(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

mod oidc {
    use super::*;

    fn resolver(server: &MockServer) -> MemoryResolver {
        MemoryResolver::new(NAMESPACE).with_oidc(
            "idp",
            OidcConfigSpec {
                authorization_url: Some(format!("{}/authorize", server.uri())),
                token_url: Some(format!("{}/token", server.uri())),
                user_info_url: Some(format!("{}/userinfo", server.uri())),
                redirect_uri: "https://krateo.example/auth".into(),
                client_id: "client".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn userinfo_fills_only_missing_claims() {
        let server = MockServer::start().await;
        let id_token = unsigned_jwt(json!({"email": "a@x", "groups": ["eng"]}));
        mount_token(&server, json!({"access_token": "at", "token_type": "Bearer", "id_token": id_token})).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "preferred_username": "alice",
                "name": "N",
                "email": "b@y",
                "groups": ["ops"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = OidcStrategy::new(context(resolver(&server), &server.uri()));
        let user = strategy.authenticate(&LoginRequest::auth_code("idp", "the-code")).await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.groups, vec!["eng"]);
        assert_eq!(user.extension(EXT_EMAIL), Some("a@x"));
        assert_eq!(user.extension(EXT_NAME), Some("N"));
    }

    #[tokio::test]
    async fn complete_claims_skip_userinfo() {
        let server = MockServer::start().await;
        let id_token = unsigned_jwt(json!({
            "preferred_username": "Bob",
            "name": "Bob B.",
            "email": "bob@x",
            "picture": "https://img/bob.png"
        }));
        mount_token(&server, json!({"access_token": "at", "token_type": "Bearer", "id_token": id_token})).await;
        Mock::given(method("GET")).and(path("/userinfo")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

        let strategy = OidcStrategy::new(context(resolver(&server), &server.uri()));
        let user = strategy.authenticate(&LoginRequest::auth_code("idp", "the-code")).await.unwrap();

        assert_eq!(user.username, "bob");
        assert!(user.groups.is_empty());
    }

    #[tokio::test]
    async fn userinfo_error_status_fails_the_login() {
        let server = MockServer::start().await;
        let id_token = unsigned_jwt(json!({"preferred_username": "alice"}));
        mount_token(&server, json!({"access_token": "at", "token_type": "Bearer", "id_token": id_token})).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_token"})))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = OidcStrategy::new(context(resolver(&server), &server.uri()));
        let err = strategy.authenticate(&LoginRequest::auth_code("idp", "the-code")).await.unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("userinfo endpoint returned 401"));
    }

    #[tokio::test]
    async fn complete_claims_need_no_access_token() {
        let server = MockServer::start().await;
        let id_token = unsigned_jwt(json!({
            "preferred_username": "dora",
            "name": "Dora",
            "email": "dora@x",
            "picture": "https://img/dora.png"
        }));
        mount_token(&server, json!({"token_type": "Bearer", "id_token": id_token})).await;

        let strategy = OidcStrategy::new(context(resolver(&server), &server.uri()));
        let user = strategy.authenticate(&LoginRequest::auth_code("idp", "the-code")).await.unwrap();

        assert_eq!(user.username, "dora");
        assert_eq!(user.extension(EXT_EMAIL), Some("dora@x"));
    }

    #[tokio::test]
    async fn missing_access_token_fails_when_userinfo_is_needed() {
        let server = MockServer::start().await;
        let id_token = unsigned_jwt(json!({"preferred_username": "erin"}));
        mount_token(&server, json!({"token_type": "Bearer", "id_token": id_token})).await;

        let strategy = OidcStrategy::new(context(resolver(&server), &server.uri()));
        let err = strategy.authenticate(&LoginRequest::auth_code("idp", "the-code")).await.unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn token_endpoint_failure_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let strategy = OidcStrategy::new(context(resolver(&server), &server.uri()));
        let err = strategy.authenticate(&LoginRequest::auth_code("idp", "the-code")).await.unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("non-200"));
    }

    #[tokio::test]
    async fn discovery_supplies_missing_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "authorization_endpoint": format!("{}/authorize", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
                "userinfo_endpoint": format!("{}/userinfo", server.uri())
            })))
            .mount(&server)
            .await;
        let id_token = unsigned_jwt(json!({"preferred_username": "carol", "name": "C", "email": "c@x", "picture": "p"}));
        mount_token(&server, json!({"access_token": "at", "token_type": "Bearer", "id_token": id_token})).await;

        let resolver = MemoryResolver::new(NAMESPACE).with_oidc(
            "idp",
            OidcConfigSpec {
                discovery_url: Some(format!("{}/.well-known/openid-configuration", server.uri())),
                redirect_uri: "https://krateo.example/auth".into(),
                client_id: "client".into(),
                ..Default::default()
            },
        );

        let strategy = OidcStrategy::new(context(resolver, &server.uri()));
        let user = strategy.authenticate(&LoginRequest::auth_code("idp", "the-code")).await.unwrap();
        assert_eq!(user.username, "carol");
    }

    #[tokio::test]
    async fn unknown_configuration_is_expectation_failed() {
        let server = MockServer::start().await;
        let strategy = OidcStrategy::new(context(MemoryResolver::new(NAMESPACE), &server.uri()));

        let err = strategy.authenticate(&LoginRequest::auth_code("missing", "the-code")).await.unwrap_err();
        assert_eq!(err.status, StatusCode::EXPECTATION_FAILED);
    }
}

mod github {
    use super::*;

    async fn setup(server: &MockServer) {
        mount_token(server, json!({"access_token": "gh-token", "token_type": "bearer"})).await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer gh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": "Octo_Cat",
                "name": "The Octocat",
                "avatar_url": "https://avatars/octo.png"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/krateo/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "Devs", "slug": "devs"},
                {"name": "Ops", "slug": "ops"},
                {"name": "Sec", "slug": "sec"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/krateo/teams/devs/memberships/Octo_Cat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "active"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/krateo/teams/sec/memberships/Octo_Cat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "active"})))
            .mount(server)
            .await;
    }

    fn spec(server: &MockServer) -> GithubConfigSpec {
        GithubConfigSpec {
            oauth2: oauth2_spec(server),
            organization: "krateo".into(),
            api_url: Some(server.uri()),
            rest_action_ref: None,
        }
    }

    fn strategy_with(server: &MockServer, spec: GithubConfigSpec, http: reqwest::Client) -> GithubStrategy {
        let resolver = MemoryResolver::new(NAMESPACE).with_github("github", spec);
        GithubStrategy::new(context(resolver, &server.uri()).with_http_client(http))
    }

    fn strategy(server: &MockServer, http: reqwest::Client) -> GithubStrategy {
        strategy_with(server, spec(server), http)
    }

    async fn mount_ops_not_member(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/orgs/krateo/teams/ops/memberships/Octo_Cat"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn member_teams_become_groups_in_order() {
        let server = MockServer::start().await;
        setup(&server).await;
        mount_ops_not_member(&server).await;

        let user = strategy(&server, reqwest::Client::new())
            .authenticate(&LoginRequest::auth_code("github", "the-code"))
            .await
            .unwrap();

        assert_eq!(user.username, dns1123("Octo_Cat"));
        assert_eq!(user.groups, vec!["devs", "sec"]);
        assert_eq!(user.display_name(), Some("The Octocat"));
    }

    #[tokio::test]
    async fn rest_action_overrides_login_and_teams() {
        let server = MockServer::start().await;
        setup(&server).await;
        mount_ops_not_member(&server).await;
        Mock::given(method("GET"))
            .and(path("/call"))
            .and(query_param("name", "github-userinfo"))
            .and(query_param("extras", r#"{"token":"gh-token"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {"preferredUsername": "octo@corp.io", "groups": ["platform"]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut spec = spec(&server);
        spec.rest_action_ref = Some(ObjectRef { name: "github-userinfo".into(), namespace: NAMESPACE.into() });
        let user = strategy_with(&server, spec, reqwest::Client::new())
            .authenticate(&LoginRequest::auth_code("github", "the-code"))
            .await
            .unwrap();

        assert_eq!(user.username, "octo-corp.io");
        assert_eq!(user.groups, vec!["platform"]);
        // Fields the action leaves out keep the GitHub profile values
        assert_eq!(user.display_name(), Some("The Octocat"));
    }

    #[tokio::test]
    async fn failed_team_probe_fails_the_login() {
        let server = MockServer::start().await;
        setup(&server).await;
        Mock::given(method("GET"))
            .and(path("/orgs/krateo/teams/ops/memberships/Octo_Cat"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let http = reqwest::Client::builder().timeout(Duration::from_millis(500)).build().unwrap();
        let err = strategy(&server, http)
            .authenticate(&LoginRequest::auth_code("github", "the-code"))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

mod oauth {
    use super::*;

    fn resolver(server: &MockServer) -> MemoryResolver {
        MemoryResolver::new(NAMESPACE).with_oauth(
            "corp",
            OAuthConfigSpec {
                oauth2: oauth2_spec(server),
                rest_action_ref: Some(ObjectRef { name: "corp-userinfo".into(), namespace: NAMESPACE.into() }),
            },
        )
    }

    async fn mount_rest_action(server: &MockServer, status: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/call"))
            .and(query_param("resource", "restactions"))
            .and(query_param("name", "corp-userinfo"))
            .and(query_param("namespace", NAMESPACE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": status})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn rest_action_supplies_the_identity() {
        let server = MockServer::start().await;
        mount_token(&server, json!({"access_token": "at", "token_type": "Bearer"})).await;
        mount_rest_action(
            &server,
            json!({"preferredUsername": "Alice.Smith", "email": "alice@corp.io", "groups": ["eng"], "name": null}),
        )
        .await;

        let strategy = OAuthStrategy::new(context(resolver(&server), &server.uri()));
        let user = strategy.authenticate(&LoginRequest::auth_code("corp", "the-code")).await.unwrap();

        assert_eq!(user.username, dns1123("Alice.Smith"));
        assert_eq!(user.groups, vec!["eng"]);
        assert_eq!(user.extension(EXT_EMAIL), Some("alice@corp.io"));
        assert_eq!(user.extension(EXT_NAME), None);
    }

    #[tokio::test]
    async fn mistyped_override_is_rejected() {
        let server = MockServer::start().await;
        mount_token(&server, json!({"access_token": "at", "token_type": "Bearer"})).await;
        mount_rest_action(&server, json!({"preferredUsername": "alice", "email": 42})).await;

        let strategy = OAuthStrategy::new(context(resolver(&server), &server.uri()));
        let err = strategy.authenticate(&LoginRequest::auth_code("corp", "the-code")).await.unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("email is not type string"));
    }

    #[tokio::test]
    async fn non_bearer_token_is_rejected() {
        let server = MockServer::start().await;
        mount_token(&server, json!({"access_token": "at", "token_type": "mac"})).await;

        let strategy = OAuthStrategy::new(context(resolver(&server), &server.uri()));
        let err = strategy.authenticate(&LoginRequest::auth_code("corp", "the-code")).await.unwrap_err();

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn failed_code_exchange_is_expectation_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
            .mount(&server)
            .await;

        let strategy = OAuthStrategy::new(context(resolver(&server), &server.uri()));
        let err = strategy.authenticate(&LoginRequest::auth_code("corp", "the-code")).await.unwrap_err();

        assert_eq!(err.status, StatusCode::EXPECTATION_FAILED);
    }
}

mod ldap {
    use super::*;

    fn strategy(directory: Arc<FakeDirectory>) -> LdapStrategy {
        let resolver = MemoryResolver::new(NAMESPACE).with_ldap(
            "forumsys",
            LdapConfigSpec {
                dial_url: "ldap://ldap.forumsys.com:389".into(),
                bind_dn: Some(SERVICE_DN.into()),
                base_dn: "dc=example,dc=com".into(),
                ..Default::default()
            },
        );
        LdapStrategy::new(context(resolver, "http://snowplow.invalid"), directory)
    }

    #[tokio::test]
    async fn ambiguous_search_never_binds_as_the_user() {
        let directory = Arc::new(FakeDirectory::new(
            vec![ldap_entry("euler", "Leonhard Euler", &[]), ldap_entry("euler2", "Euler Two", &[])],
            "password",
        ));

        let err = strategy(directory.clone())
            .authenticate(&LoginRequest::password("forumsys", "euler", "password"))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::MULTIPLE_CHOICES);
        assert_eq!(directory.binds(), vec![SERVICE_DN]);
    }

    #[tokio::test]
    async fn empty_search_never_binds_as_the_user() {
        let directory = Arc::new(FakeDirectory::new(vec![], "password"));

        let err = strategy(directory.clone())
            .authenticate(&LoginRequest::password("forumsys", "nobody", "password"))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(directory.binds(), vec![SERVICE_DN]);
    }

    #[tokio::test]
    async fn single_match_binds_and_maps_attributes() {
        let directory =
            Arc::new(FakeDirectory::new(vec![ldap_entry("euler", "Leonhard Euler", &["mathematicians"])], "password"));

        let user = strategy(directory.clone())
            .authenticate(&LoginRequest::password("forumsys", "euler", "password"))
            .await
            .unwrap();

        assert_eq!(user.username, "euler");
        assert_eq!(user.groups, vec!["mathematicians"]);
        assert_eq!(user.display_name(), Some("Leonhard Euler"));
        assert_eq!(directory.binds(), vec![SERVICE_DN.to_string(), "uid=euler,dc=example,dc=com".to_string()]);
    }

    #[tokio::test]
    async fn wrong_password_is_forbidden() {
        let directory = Arc::new(FakeDirectory::new(vec![ldap_entry("euler", "Leonhard Euler", &[])], "password"));

        let err = strategy(directory)
            .authenticate(&LoginRequest::password("forumsys", "euler", "wrong"))
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }
}
