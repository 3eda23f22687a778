//! Execution-role resolution against mocked STS and IAM.

use tgi_endpoint::{AwsIdentity, Credentials, EndpointError, Session, SessionConfig};
use url::Url;
use wiremock::matchers::{body_string_contains, header, method};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

fn identity(server: &MockServer) -> AwsIdentity {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    AwsIdentity::new(credentials(), "us-west-2")
        .unwrap()
        .with_endpoints(base.clone(), base)
}

fn credentials() -> Credentials {
    Credentials::new("AKIDEXAMPLE", "secret").with_session_token("token")
}

fn caller_identity(arn: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult>
    <Arn>{arn}</Arn>
    <UserId>AIDAEXAMPLE</UserId>
    <Account>123456789012</Account>
  </GetCallerIdentityResult>
</GetCallerIdentityResponse>"#
    ))
}

fn get_role() -> MockBuilder {
    Mock::given(method("POST"))
        .and(body_string_contains("Action=GetRole"))
        .and(body_string_contains("RoleName=sagemaker_execution_role"))
}

fn get_caller_identity() -> MockBuilder {
    Mock::given(method("POST"))
        .and(body_string_contains("Action=GetCallerIdentity"))
        .and(header("x-amz-security-token", "token"))
}

#[tokio::test]
async fn test_assumed_role_needs_no_iam_lookup() {
    let server = MockServer::start().await;
    get_caller_identity()
        .respond_with(caller_identity(
            "arn:aws:sts::123456789012:assumed-role/AmazonSageMaker-ExecutionRole-20240501T123045/SageMaker",
        ))
        .expect(1)
        .mount(&server)
        .await;
    get_role()
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let session = Session::resolve(
        SessionConfig::new("us-west-2", credentials()),
        &identity(&server),
    )
    .await
    .unwrap();

    assert_eq!(session.region, "us-west-2");
    assert_eq!(
        session.role_arn,
        "arn:aws:iam::123456789012:role/service-role/AmazonSageMaker-ExecutionRole-20240501T123045"
    );
}

#[tokio::test]
async fn test_user_identity_falls_back_to_iam() {
    let server = MockServer::start().await;
    get_caller_identity()
        .respond_with(caller_identity("arn:aws:iam::123456789012:user/dev"))
        .mount(&server)
        .await;
    get_role()
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<GetRoleResponse xmlns="https://iam.amazonaws.com/doc/2010-05-08/">
  <GetRoleResult>
    <Role>
      <Path>/</Path>
      <RoleName>sagemaker_execution_role</RoleName>
      <Arn>arn:aws:iam::123456789012:role/sagemaker_execution_role</Arn>
    </Role>
  </GetRoleResult>
</GetRoleResponse>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::resolve(
        SessionConfig::new("us-west-2", credentials()),
        &identity(&server),
    )
    .await
    .unwrap();

    assert_eq!(
        session.role_arn,
        "arn:aws:iam::123456789012:role/sagemaker_execution_role"
    );
}

#[tokio::test]
async fn test_missing_fallback_role_is_role_error() {
    let server = MockServer::start().await;
    get_caller_identity()
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "<ErrorResponse><Error><Code>AccessDenied</Code>\
             <Message>not authorized to perform sts:GetCallerIdentity</Message></Error></ErrorResponse>",
        ))
        .mount(&server)
        .await;
    get_role()
        .respond_with(ResponseTemplate::new(404).set_body_string(
            "<ErrorResponse><Error><Type>Sender</Type><Code>NoSuchEntity</Code>\
             <Message>The role with name sagemaker_execution_role cannot be found.</Message>\
             </Error></ErrorResponse>",
        ))
        .mount(&server)
        .await;

    let err = Session::resolve(
        SessionConfig::new("us-west-2", credentials()),
        &identity(&server),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, EndpointError::Role(ref m) if m.contains("sagemaker_execution_role")));
}

#[tokio::test]
async fn test_configured_role_skips_lookups() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = SessionConfig {
        role_arn: Some("arn:aws:iam::123456789012:role/Custom".to_string()),
        ..SessionConfig::new("us-west-2", credentials())
    };
    let session = Session::resolve(config, &identity(&server)).await.unwrap();
    assert_eq!(session.role_arn, "arn:aws:iam::123456789012:role/Custom");
}
