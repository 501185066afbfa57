use super::utils::*;

#[test]
fn test_clean_path_absolute() {
    assert_eq!(
        clean_path("/etc/upctl/values.yaml").to_str(),
        Some("/etc/upctl/values.yaml")
    );
}

#[test]
fn test_clean_path_home() {
    let home = dirs::home_dir().unwrap();
    assert_eq!(clean_path("~/overrides"), home.join("overrides"));
}

#[test]
fn test_clean_path_relative() {
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(clean_path("overrides/redis.yaml"), cwd.join("overrides/redis.yaml"));
}

#[test]
fn test_fallback_first_success() {
    let chain = Fallback::attempt(|| "12".parse::<u16>()).or_try(|| Ok::<_, String>(7));
    assert!(chain.failures().is_empty());
    assert_eq!(chain.or_warn("number", 0), 12);
}

#[test]
fn test_fallback_falls_through() {
    let chain = Fallback::attempt(|| "x".parse::<u16>()).or_try(|| Err::<u16, _>("nope"));
    assert_eq!(chain.failures().len(), 2);
    assert_eq!(chain.failures()[1], "nope");
    assert_eq!(chain.or_warn("number", 42), 42);
}

#[test]
fn test_fallback_stops_after_success() {
    let mut called = false;
    let chain = Fallback::attempt(|| Ok::<_, String>(1)).or_try(|| {
        called = true;
        Ok::<_, String>(2)
    });
    assert_eq!(chain.or_warn("number", 0), 1);
    assert!(!called);
}
