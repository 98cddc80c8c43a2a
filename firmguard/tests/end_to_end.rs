use firmguard::algorithms::sha256_hex;
use firmguard::baseline::{BaselineBuilder, FirmwareBaseline};
use firmguard::config::BaselineProfile;
use firmguard::detection::{compare, FindingKind, RecommendedAction, RiskLevel};
use firmguard::snapshot::{EfiVariable, LiveSystemSnapshot};
use std::collections::BTreeMap;

const IMAGE_SIZE: usize = 65536;

fn image() -> Vec<u8> {
    let mut image = vec![0u8; IMAGE_SIZE];
    image[100..104].copy_from_slice(b"_FVH");
    image[5000..5004].copy_from_slice(&[0x30, 0x82, 0x01, 0xF4]);
    image
}

fn build(image: &[u8]) -> FirmwareBaseline {
    BaselineBuilder::new(&BaselineProfile::default())
        .bios_version("G615LP.303")
        .build(image, "G615LP.bin")
        .unwrap() //#[allow_ci]
}

fn snapshot(version: &str, aux: &str) -> LiveSystemSnapshot {
    LiveSystemSnapshot {
        dmi_fields: BTreeMap::from([
            ("bios_vendor".to_string(), "American Megatrends Inc.".to_string()),
            ("bios_version".to_string(), version.to_string()),
        ]),
        efi_variables: BTreeMap::from([(
            "Boot0000-8be4df61-93ca-11d2-aa0d-00e098032b8c".to_string(),
            EfiVariable {
                size: 8,
                sha256: sha256_hex(b"boot").unwrap(), //#[allow_ci]
            },
        )]),
        auxiliary_tool_output: Some(aux.to_string()),
    }
}

#[test]
fn test_baseline_of_synthetic_image() {
    let image = image();
    let baseline = build(&image);

    assert_eq!(baseline.metadata.firmware_size, IMAGE_SIZE as u64);
    assert_eq!(baseline.hashes.full_sha256, sha256_hex(&image).unwrap()); //#[allow_ci]

    let volumes = baseline.volume_list();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].offset, 100);
    assert_eq!(
        volumes[0].header_hash,
        sha256_hex(&image[100..1124]).unwrap() //#[allow_ci]
    );

    let certificates = baseline.certificate_list();
    assert_eq!(certificates.len(), 1);
    assert_eq!(certificates[0].offset, 5000);
    assert_eq!(certificates[0].length, 504);
    assert_eq!(
        certificates[0].sha256,
        sha256_hex(&image[5000..5504]).unwrap() //#[allow_ci]
    );

    assert_eq!(baseline.signatures.get("uefi_fv_header"), Some(&vec![100]));
    assert!(!baseline.signatures.contains_key("dxe_core"));

    let boot_block = &baseline.hashes.regions["boot_block"];
    assert_eq!(boot_block.size, IMAGE_SIZE as u64);
    assert_eq!(boot_block.sha256, baseline.hashes.full_sha256);
    assert!(!baseline.hashes.regions.contains_key("dxe_region"));
}

#[test]
fn test_chunks_cover_image_in_order() {
    let mut image = image();
    image.extend_from_slice(&[0xAA; 1000]);
    let baseline = build(&image);

    let chunks = &baseline.hashes.chunk_hashes;
    assert_eq!(chunks.len(), 17);
    let mut expected_offset = 0;
    for chunk in chunks {
        assert_eq!(chunk.offset, expected_offset);
        expected_offset += chunk.size;
    }
    assert_eq!(expected_offset, image.len() as u64);
    assert_eq!(chunks[16].size, 1000);
}

#[test]
fn test_builds_are_deterministic() {
    let image = image();
    let first = build(&image);
    let second = build(&image);

    assert_eq!(first.hashes, second.hashes);
    assert_eq!(first.signatures, second.signatures);
    assert_eq!(first.certificates, second.certificates);
    assert_eq!(first.uefi_volumes, second.uefi_volumes);
    assert_eq!(first.bootkit_indicators, second.bootkit_indicators);
}

#[test]
fn test_saved_baseline_drives_comparison() {
    let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
    let path = dir.path().join("baseline.json");
    build(&image()).save(&path).unwrap(); //#[allow_ci]

    let baseline = FirmwareBaseline::load(&path).unwrap(); //#[allow_ci]
    assert_eq!(baseline.metadata.bios_version, "G615LP.303");

    let clean = compare(&baseline, &snapshot("G615LP.303-OEM", "No updates"))
        .unwrap(); //#[allow_ci]
    assert_eq!(clean.risk_level, RiskLevel::Clean);
    assert_eq!(clean.recommended_action, RecommendedAction::Continue);
    assert_eq!(clean.baseline_source, "G615LP.bin");

    let compromised = compare(
        &baseline,
        &snapshot("G615LP.302", "rootkit staged in DXE driver"),
    )
    .unwrap(); //#[allow_ci]
    assert_eq!(compromised.risk_level, RiskLevel::Critical);
    assert_eq!(
        compromised.recommended_action,
        RecommendedAction::ImmediateRecovery
    );
    assert_eq!(compromised.threats_detected.len(), 1);
    assert_eq!(compromised.threats_detected[0].kind, FindingKind::PatternMatch);
    assert_eq!(
        compromised.modifications_found[0].kind,
        FindingKind::VersionMismatch
    );
}

#[test]
fn test_tampered_baseline_is_rejected() {
    let dir = tempfile::tempdir().unwrap(); //#[allow_ci]
    let path = dir.path().join("baseline.json");
    let mut baseline = build(&image());
    baseline.hashes.full_sha256 = "not-a-digest".to_string();
    std::fs::write(&path, serde_json::to_vec(&baseline).unwrap()).unwrap(); //#[allow_ci]

    assert!(FirmwareBaseline::load(&path).is_err());
}
