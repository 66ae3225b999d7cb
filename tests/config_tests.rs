use std::time::Duration;

use particles_wallpaper::Error;
use particles_wallpaper::config::{BackgroundUri, Configuration, SceneOptions, Settings};

#[test]
fn empty_config_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg, Configuration::default());
    assert_eq!(cfg.settings.background_color, 0xFF21_2121);
    assert_eq!(cfg.settings.background_uri, BackgroundUri::None);
    assert_eq!(cfg.settings.frame_delay(), Duration::from_millis(10));
    assert!(cfg.settings.background_scroll);
    assert_eq!(cfg.surface.title, "Particles");
    assert_eq!(cfg.surface.num_samples, 4);
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
settings:
  background-color: 4278255360
  background-uri: "file:///walls/forest.jpg"
  frame-delay-ms: 33
  background-scroll: false
scene:
  density: 120
  dot-radius-range: [0.5, 2.0]
  line-distance: 100.0
surface:
  title: "Bg"
  fullscreen: true
  desired-size: [3840, 1080]
  num-samples: 8
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.settings.background_color, 0xFF00_FF00);
    assert_eq!(
        cfg.settings.background_uri,
        BackgroundUri::Uri("file:///walls/forest.jpg".into())
    );
    assert_eq!(cfg.settings.frame_delay_ms, 33);
    assert!(!cfg.settings.background_scroll);
    assert_eq!(cfg.scene.density, 120);
    assert_eq!(cfg.scene.dot_radius_range, [0.5, 2.0]);
    assert!((cfg.scene.line_distance - 100.0).abs() < f32::EPSILON);
    assert_eq!(
        cfg.scene.line_thickness,
        SceneOptions::default().line_thickness
    );
    assert!(cfg.surface.fullscreen);
    assert_eq!(cfg.surface.desired_size, Some([3840, 1080]));
    assert_eq!(cfg.surface.num_samples, 8);
}

#[test]
fn from_yaml_str_reports_malformed_yaml() {
    let err = Configuration::from_yaml_str("scene: [1, 2").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().starts_with("malformed configuration"));

    let cfg = Configuration::from_yaml_str("surface:\n  num-samples: 1\n").unwrap();
    assert_eq!(cfg.surface.num_samples, 1);
}

#[test]
fn validated_rejects_unsupported_sample_counts() {
    for samples in [0, 3, 32] {
        let yaml = format!("surface:\n  num-samples: {samples}\n");
        let cfg = Configuration::from_yaml_str(&yaml).unwrap();
        let err = cfg.validated().unwrap_err();
        assert!(format!("{err:#}").contains("num-samples"), "samples {samples}");
    }
    for samples in [1, 2, 4, 8, 16] {
        let yaml = format!("surface:\n  num-samples: {samples}\n");
        assert!(Configuration::from_yaml_str(&yaml).unwrap().validated().is_ok());
    }
}

#[test]
fn none_uri_literal_parses_as_none() {
    let yaml = r#"
settings:
  background-uri: none
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.settings.background_uri.is_none());
}

#[test]
fn unknown_fields_are_rejected() {
    let err = serde_yaml::from_str::<Configuration>("wallpaper-path: /walls\n");
    assert!(err.is_err());

    let err = serde_yaml::from_str::<Configuration>("settings:\n  background-colour: 1\n");
    assert!(err.is_err());
}

#[test]
fn validated_rejects_inverted_radius_range() {
    let yaml = r#"
scene:
  dot-radius-range: [4.0, 1.0]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("dot-radius-range"));
}

#[test]
fn validated_rejects_zero_desired_size() {
    let yaml = r#"
surface:
  desired-size: [0, 1080]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn validated_rejects_huge_frame_delay() {
    let cfg = Configuration {
        settings: Settings {
            frame_delay_ms: 60_000,
            ..Settings::default()
        },
        ..Configuration::default()
    };
    assert!(cfg.validated().is_err());
}

#[test]
fn validated_accepts_zero_frame_delay() {
    let cfg = Configuration {
        settings: Settings {
            frame_delay_ms: 0,
            ..Settings::default()
        },
        ..Configuration::default()
    };
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.settings.frame_delay(), Duration::ZERO);
}

#[test]
fn from_yaml_file_reads_and_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "settings:\n  frame-delay-ms: 16\n").unwrap();

    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.settings.frame_delay_ms, 16);

    let missing = dir.path().join("missing.yaml");
    let err = Configuration::from_yaml_file(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("missing.yaml"));
}
