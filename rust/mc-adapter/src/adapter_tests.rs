use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytemuck::cast_slice;
use mc_core::{ArtifactStore, MemoryArtifactStore};
use safetensors::tensor::{Dtype, TensorView};

use crate::{
    adapter_to_bytes, apply_adapters, load_adapter, load_adapter_from, load_base, load_base_file,
    save_weights, validate_adapters, weights_to_bytes, AdapterDelta, AdapterError,
    AdapterRegistry, Matrix, WeightView,
};

fn m(rows: usize, cols: usize, data: &[f32]) -> Matrix {
    Matrix::new(rows, cols, data.to_vec()).unwrap()
}

fn base() -> WeightView {
    let mut v = WeightView::new();
    v.insert("proj", m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    v.insert("other", m(1, 2, &[0.5, -0.5]));
    v
}

fn delta(alpha: f32) -> AdapterDelta {
    // B [2x1], A [1x3]
    AdapterDelta::new("proj", m(1, 3, &[1.0, 0.0, 1.0]), m(2, 1, &[1.0, 2.0]), alpha).unwrap()
}

#[test]
fn empty_adapter_list_is_identity() {
    let b = base();
    let none: [AdapterDelta; 0] = [];
    let out = apply_adapters(&b, &none).unwrap();
    assert!(out.bits_eq(&b));
    for name in b.names() {
        assert!(out.shares(&b, name));
    }
}

#[test]
fn single_delta_adds_scaled_product() {
    let b = base();
    let out = apply_adapters(&b, &[delta(2.0)]).unwrap();
    // scale = alpha / r = 2; B·A = [[1,0,1],[2,0,2]]
    assert_eq!(
        out.matrix("proj").unwrap().data(),
        &[3.0, 2.0, 5.0, 8.0, 5.0, 10.0]
    );
    assert!(out.shares(&b, "other"));
    assert!(!out.shares(&b, "proj"));
    // Base untouched.
    assert_eq!(b.matrix("proj").unwrap().data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn composition_is_ordered_and_additive() {
    let b = base();
    let d1 = delta(1.0);
    let d2 = AdapterDelta::new("proj", m(1, 3, &[0.0, 1.0, 0.0]), m(2, 1, &[-1.0, 1.0]), 1.0)
        .unwrap();
    let both = apply_adapters(&b, [&d1, &d2]).unwrap();
    let stepwise = apply_adapters(&apply_adapters(&b, [&d1]).unwrap(), [&d2]).unwrap();
    assert!(both.bits_eq(&stepwise));
}

#[test]
fn shape_mismatch_is_fatal() {
    let b = base();
    let bad = AdapterDelta::new("proj", m(1, 4, &[0.0; 4]), m(2, 1, &[0.0; 2]), 1.0).unwrap();
    match apply_adapters(&b, [&bad]) {
        Err(AdapterError::ShapeMismatch {
            target,
            expected,
            got,
        }) => {
            assert_eq!(target, "proj");
            assert_eq!(expected, (2, 3));
            assert_eq!(got, (2, 4));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(validate_adapters(&b, [&bad]).is_err());
}

#[test]
fn missing_target_is_fatal() {
    let b = base();
    let d = AdapterDelta::new("nope", m(1, 3, &[0.0; 3]), m(2, 1, &[0.0; 2]), 1.0).unwrap();
    assert!(matches!(
        apply_adapters(&b, [&d]),
        Err(AdapterError::MissingTensor(name)) if name == "nope"
    ));
}

#[test]
fn inconsistent_rank_is_rejected() {
    let err = AdapterDelta::new("proj", m(2, 3, &[0.0; 6]), m(2, 1, &[0.0; 2]), 1.0).unwrap_err();
    assert!(matches!(err, AdapterError::ShapeMismatch { .. }));
}

#[test]
fn adapter_bytes_roundtrip_keeps_alpha() {
    let d = delta(3.5);
    let bytes = adapter_to_bytes(std::slice::from_ref(&d)).unwrap();
    let loaded = load_adapter(&bytes).unwrap();
    assert_eq!(loaded, vec![d]);
}

#[test]
fn alpha_defaults_to_rank() {
    let a = [1.0f32, 0.0, 1.0, 0.0, 1.0, 0.0];
    let b = [1.0f32, 1.0, 1.0, 1.0];
    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    tensors.insert(
        "proj.lora_a".to_string(),
        TensorView::new(Dtype::F32, vec![2, 3], cast_slice(&a)).unwrap(),
    );
    tensors.insert(
        "proj.lora_b".to_string(),
        TensorView::new(Dtype::F32, vec![2, 2], cast_slice(&b)).unwrap(),
    );
    let bytes = safetensors::serialize(&tensors, &None).unwrap();
    let loaded = load_adapter(&bytes).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].rank(), 2);
    assert_eq!(loaded[0].alpha(), 2.0);
    assert_eq!(loaded[0].scale(), 1.0);

    let meta = HashMap::from([("alpha".to_string(), "8".to_string())]);
    let bytes = safetensors::serialize(&tensors, &Some(meta)).unwrap();
    assert_eq!(load_adapter(&bytes).unwrap()[0].alpha(), 8.0);
}

#[test]
fn unpaired_lora_tensor_is_missing() {
    let a = [1.0f32, 0.0, 1.0];
    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    tensors.insert(
        "proj.lora_a".to_string(),
        TensorView::new(Dtype::F32, vec![1, 3], cast_slice(&a)).unwrap(),
    );
    let bytes = safetensors::serialize(&tensors, &None).unwrap();
    assert!(matches!(
        load_adapter(&bytes),
        Err(AdapterError::MissingTensor(name)) if name == "proj.lora_b"
    ));
}

#[test]
fn bad_alpha_metadata_is_rejected() {
    let bytes = adapter_to_bytes(&[delta(1.0)]).unwrap();
    let st = safetensors::SafeTensors::deserialize(&bytes).unwrap();
    let tensors: BTreeMap<String, TensorView<'_>> = st.tensors().into_iter().collect();
    let meta = HashMap::from([("proj.alpha".to_string(), "lots".to_string())]);
    let bytes = safetensors::serialize(&tensors, &Some(meta)).unwrap();
    assert!(matches!(
        load_adapter(&bytes),
        Err(AdapterError::InvalidMetadata { .. })
    ));
}

#[test]
fn base_loading_promotes_vectors_and_rejects_other_dtypes() {
    let bias = [1.0f32, 2.0, 3.0];
    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    tensors.insert(
        "bias".to_string(),
        TensorView::new(Dtype::F32, vec![3], cast_slice(&bias)).unwrap(),
    );
    let bytes = safetensors::serialize(&tensors, &None).unwrap();
    let v = load_base(&bytes).unwrap();
    assert_eq!(v.matrix("bias").unwrap().shape(), (1, 3));

    let ints = [1u8, 2, 3];
    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    tensors.insert(
        "ints".to_string(),
        TensorView::new(Dtype::U8, vec![3], &ints).unwrap(),
    );
    let bytes = safetensors::serialize(&tensors, &None).unwrap();
    assert!(matches!(
        load_base(&bytes),
        Err(AdapterError::InvalidTensor { .. })
    ));
}

#[test]
fn weights_file_roundtrip_is_bit_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("w").join("base.safetensors");
    let b = base();
    save_weights(&b, None, &path).unwrap();
    let loaded = load_base_file(&path).unwrap();
    assert!(loaded.bits_eq(&b));
}

#[test]
fn adapters_load_through_artifact_store() {
    let store = MemoryArtifactStore::new();
    store
        .put_blob("adapters/tactics.safetensors", &adapter_to_bytes(&[delta(1.0)]).unwrap())
        .unwrap();
    store
        .put_blob("base.safetensors", &weights_to_bytes(&base(), None).unwrap())
        .unwrap();
    let deltas = load_adapter_from(&store, "adapters/tactics.safetensors").unwrap();
    let b = crate::load_base_from(&store, "base.safetensors").unwrap();
    assert!(validate_adapters(&b, &deltas).is_ok());
    assert!(matches!(
        load_adapter_from(&store, "missing"),
        Err(AdapterError::Artifact(_))
    ));
}

#[test]
fn registry_versions_and_snapshots_are_stable() {
    let reg = AdapterRegistry::new();
    assert_eq!(reg.version(), 0);
    let before = reg.snapshot();

    assert_eq!(reg.insert("tactics", vec![delta(1.0)]), 1);
    assert_eq!(reg.insert("endgame", vec![delta(2.0)]), 2);

    // The old snapshot is unaffected by later publications.
    assert_eq!(before.version(), 0);
    assert!(before.is_empty());

    let snap = reg.snapshot();
    assert_eq!(snap.names().collect::<Vec<_>>(), vec!["endgame", "tactics"]);
    let resolved = snap.resolve(&["tactics", "endgame"]).unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].alpha(), 1.0);
    assert_eq!(resolved[1].alpha(), 2.0);

    assert!(matches!(
        snap.resolve(&["nope"]),
        Err(AdapterError::UnknownAdapter(n)) if n == "nope"
    ));

    assert_eq!(reg.remove("tactics"), Some(3));
    assert_eq!(reg.remove("tactics"), None);
    assert!(snap.get("tactics").is_some());

    let v = reg.publish(BTreeMap::new());
    assert!(v > 3);
    assert!(reg.snapshot().is_empty());
}

#[test]
fn concurrent_readers_see_consistent_versions() {
    let reg = Arc::new(AdapterRegistry::new());
    let b = Arc::new(base());
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reg = Arc::clone(&reg);
            let b = Arc::clone(&b);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let snap = reg.snapshot();
                    // Every published version v holds exactly v adapters.
                    assert_eq!(snap.len() as u64, snap.version());
                    let names: Vec<&str> = snap.names().collect();
                    let deltas = snap.resolve(&names).unwrap();
                    apply_adapters(&b, deltas).unwrap();
                }
            })
        })
        .collect();
    for i in 0..50 {
        reg.insert(format!("a{i:02}"), vec![delta(0.1)]);
    }
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(reg.version(), 50);
}
