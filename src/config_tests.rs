use std::path::{Path, PathBuf};

use super::config::*;
use super::errors::ConfigError;
use super::test_support::config_file;

const SAMPLE: &str = r#"
services:
  web:
    image: nginx:latest
    ports:
      - "8080:80"
      - 9000
      - target: 443
        published: 8443
        host_ip: 127.0.0.1
    environment:
      A: b
  db:
    image: mysql:8
volumes:
  data: {}
packages:
  - name: redis
    repo: bitnami/redis
    namespace: cache
    override: redis.yaml
mysql:
  database: app
  user: root
"#;

fn parse(contents: &str) -> Result<Config, ConfigError> {
    Config::parse(Path::new("/tmp/.upctl.yaml"), contents)
}

#[test]
fn test_parse_services() {
    let config = parse(SAMPLE).unwrap();
    let names: Vec<&String> = config.services().keys().collect();
    assert_eq!(names, vec!["db", "web"]);

    let web = &config.services()["web"];
    assert_eq!(web.image.as_deref(), Some("nginx:latest"));
    assert_eq!(web.ports, vec!["8080:80", "9000", "127.0.0.1:8443:443"]);

    assert!(config.has_service("db"));
    assert!(!config.has_service("cache"));
}

#[test]
fn test_auxiliary_sections() {
    let config = parse(SAMPLE).unwrap();

    let packages = config.packages().unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].override_file, "redis.yaml");
    assert!(config.repositories().unwrap().is_empty());

    let mysql = config.mysql().unwrap();
    assert_eq!(mysql.database, "app");
    assert_eq!(mysql.password, "");

    assert!(config.teleport().unwrap().host.is_empty());
    assert!(config.kube_context().is_none());
}

#[test]
fn test_broken_auxiliary_section_is_lazy() {
    let config = parse("services:\n  web:\n    image: nginx\npackages: 3\n").unwrap();
    assert!(config.has_service("web"));
    match config.packages() {
        Err(ConfigError::Structure { key, .. }) => assert_eq!(key, "packages"),
        other => panic!("Expected structure error, got {:?}", other),
    }
}

#[test]
fn test_empty_document() {
    let config = parse("").unwrap();
    assert!(config.services().is_empty());
}

#[test]
fn test_yaml_syntax_error() {
    match parse("services: [web") {
        Err(ConfigError::Parse { .. }) => {}
        other => panic!("Expected parse error, got {:?}", other),
    }
}

#[test]
fn test_structure_errors() {
    let cases = [
        ("- a\n- b\n", "<root>"),
        ("services: [web]\n", "services"),
        ("services:\n  web: nginx\n", "services.web"),
        ("services:\n  web:\n    image: [a]\n", "services.web.image"),
        ("services:\n  web:\n    ports: \"80:80\"\n", "services.web.ports"),
    ];
    for (contents, expected) in cases {
        match parse(contents) {
            Err(ConfigError::Structure { key, .. }) => assert_eq!(key, expected),
            other => panic!("Expected structure error for {:?}, got {:?}", contents, other),
        }
    }
}

#[test]
fn test_section_problems() {
    let config = parse("services:\n  web: {}\nvolumes: [a]\nnetworks: {}\n").unwrap();
    assert_eq!(config.section_problems(), vec!["'volumes' must be a mapping"]);
}

#[test]
fn test_locate_explicit() {
    let file = config_file("services: {}\n");
    let found = Config::locate(Some(file.path())).unwrap();
    assert_eq!(found, file.path());
}

#[test]
fn test_locate_explicit_missing() {
    let missing = PathBuf::from("/nonexistent/.upctl.yaml");
    match Config::locate(Some(&missing)) {
        Err(ConfigError::NotFound(searched)) => assert_eq!(searched, vec![missing]),
        other => panic!("Expected not found, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_from_file() {
    let file = config_file(SAMPLE);
    let config = Config::load(Some(file.path())).await.unwrap();
    assert_eq!(config.path, file.path());
    assert_eq!(config.services().len(), 2);
}

#[tokio::test]
#[should_panic]
async fn test_load_does_not_exist() {
    Config::load(Some(Path::new("abc/.upctl.yaml")))
        .await
        .unwrap();
}
