//! SNMPv3 (USM) requests against a live gateway.

mod common;

use bytes::Bytes;
use common::*;
use snmp_gateway::attribute::AttributeValue;
use snmp_gateway::error::ErrorStatus;
use snmp_gateway::message::SecurityLevel;
use snmp_gateway::pdu::PduType;
use snmp_gateway::security::{DirectoryEntry, SecurityUser, StaticDirectory};
use snmp_gateway::v3::{AuthProtocol, PrivProtocol, UsmReport};
use snmp_gateway::{SnmpGateway, Value};
use std::sync::Arc;

fn alice() -> SecurityUser {
    SecurityUser::new(OPS_USER)
        .with_auth(AuthProtocol::Sha1, AUTH_PASSWORD)
        .with_privacy(PrivProtocol::Aes128, PRIV_PASSWORD)
}

async fn serve(gateway: SnmpGateway) -> (SnmpGateway, Attributes, Manager) {
    init_tracing();
    let attributes = Attributes::new();
    for attribute in attributes.all() {
        gateway.add_attribute(attribute).unwrap();
    }
    let addr = gateway.start().await.unwrap();
    (gateway, attributes, Manager::new(addr).await)
}

#[tokio::test]
async fn discovery_reports_engine() {
    let (gateway, _attributes, manager) = serve(SnmpGateway::new(v3_params(config()).build())).await;

    let engine = manager.discover().await;
    assert_eq!(&engine.engine_id, gateway.agent().engine_id());
    assert_eq!(engine.boots, 1);

    gateway.stop().await;
}

#[tokio::test]
async fn auth_priv_get_and_set() {
    let (gateway, attributes, manager) = serve(SnmpGateway::new(v3_params(config()).build())).await;

    let response = manager
        .v3(&alice(), SecurityLevel::AuthPriv, manager.get_pdu(&[requests_oid()]))
        .await
        .unwrap();
    assert_eq!(response.pdu_type, PduType::Response);
    assert_eq!(response.varbinds[0].value, Value::Counter64(1234));

    let set = manager.set_pdu(vec![(
        name_oid(),
        Value::OctetString(Bytes::from_static(b"secured")),
    )]);
    let response = manager.v3(&alice(), SecurityLevel::AuthPriv, set).await.unwrap();
    assert_eq!(response.error_status(), ErrorStatus::NoError);
    assert_eq!(
        attributes.name.value(),
        AttributeValue::String("secured".into())
    );

    gateway.stop().await;
}

#[tokio::test]
async fn wrong_password_is_reported() {
    let (gateway, _attributes, manager) = serve(SnmpGateway::new(v3_params(config()).build())).await;

    let impostor = SecurityUser::new(OPS_USER)
        .with_auth(AuthProtocol::Sha1, "not-the-password")
        .with_privacy(PrivProtocol::Aes128, PRIV_PASSWORD);
    let report = manager
        .v3(&impostor, SecurityLevel::AuthPriv, manager.get_pdu(&[enabled_oid()]))
        .await
        .unwrap();
    assert_eq!(report.pdu_type, PduType::Report);
    assert_eq!(report.varbinds[0].oid, UsmReport::WrongDigest.oid());

    gateway.stop().await;
}

#[tokio::test]
async fn level_below_group_minimum_is_refused() {
    let (gateway, attributes, manager) = serve(SnmpGateway::new(v3_params(config()).build())).await;

    // The group requires authPriv; authNoPriv finds no access entry
    let set = manager.set_pdu(vec![(enabled_oid(), Value::Integer(0))]);
    let response = manager.v3(&alice(), SecurityLevel::AuthNoPriv, set).await;
    if let Some(response) = response {
        assert_ne!(response.error_status(), ErrorStatus::NoError);
    }
    assert_eq!(attributes.enabled.value(), AttributeValue::Bool(true));

    gateway.stop().await;
}

#[tokio::test]
async fn directory_sourced_users() {
    let directory = StaticDirectory::new(vec![
        DirectoryEntry::new("cn=ops,ou=groups,dc=example,dc=com")
            .with("objectClass", "snmpGroup")
            .with("cn", "ops")
            .with("snmpSecurityLevel", "authPriv")
            .with("snmpAccessRights", "read"),
        DirectoryEntry::new("cn=alice,ou=users,dc=example,dc=com")
            .with("objectClass", "snmpUser")
            .with("memberOf", "ops")
            .with("uid", OPS_USER)
            .with("snmpAuthProtocol", "SHA")
            .with("userPassword", AUTH_PASSWORD)
            .with("snmpPrivProtocol", "AES")
            .with("snmpPrivKey", PRIV_PASSWORD),
    ]);
    let config = config()
        .param("ldap-uri", "ldap://directory.example.com")
        .param("ldap-groups", "ops")
        .param("ldap-base-dn", "dc=example,dc=com")
        .build();
    let gateway = SnmpGateway::new(config).with_directory(Arc::new(directory));
    let (gateway, _attributes, manager) = serve(gateway).await;

    let response = manager
        .v3(&alice(), SecurityLevel::AuthPriv, manager.get_pdu(&[enabled_oid()]))
        .await
        .unwrap();
    assert_eq!(response.varbinds[0].value, Value::Integer(1));

    gateway.stop().await;
}
