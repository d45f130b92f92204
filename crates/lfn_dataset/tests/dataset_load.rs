use burn::backend::ndarray::NdArray;
use lfn_dataset::{
    index_instances, DatasetConfig, DatasetError, RaySampler, SamplerConfig, SceneClassDataset,
};
use std::fs;
use std::path::Path;

const POSE: &str = "1 0 0 0\n0 1 0 0\n0 0 1 -2\n0 0 0 1\n";

fn write_instance(root: &Path, name: &str, views: usize, size: u32) {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("rgb")).unwrap();
    fs::create_dir_all(dir.join("pose")).unwrap();
    fs::write(dir.join("intrinsics.txt"), "8.0 4.0 4.0 0.\n0. 0. 0.\n1.\n8 8\n").unwrap();
    for v in 0..views {
        let img = image::RgbImage::from_fn(size, size, |x, _| {
            image::Rgb([(x * 30) as u8, 255, 0])
        });
        img.save(dir.join("rgb").join(format!("{v:06}.png"))).unwrap();
        fs::write(dir.join("pose").join(format!("{v:06}.txt")), POSE).unwrap();
    }
}

#[test]
fn indexes_instances_in_sorted_order() {
    let tmp = tempfile::tempdir().unwrap();
    write_instance(tmp.path(), "b_chair", 2, 8);
    write_instance(tmp.path(), "a_chair", 3, 8);
    fs::create_dir_all(tmp.path().join("not_an_instance")).unwrap();

    let all = index_instances(tmp.path(), None).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "a_chair");
    assert_eq!(all[0].views.len(), 3);

    let limited = index_instances(tmp.path(), Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn missing_pose_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    write_instance(tmp.path(), "chair", 1, 8);
    fs::remove_file(tmp.path().join("chair/pose/000000.txt")).unwrap();
    let err = index_instances(tmp.path(), None).unwrap_err();
    assert!(matches!(err, DatasetError::MissingPose { .. }));
}

#[test]
fn empty_root_reports_no_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let err = index_instances(tmp.path(), None).unwrap_err();
    assert!(matches!(err, DatasetError::NoInstances { .. }));
}

#[test]
fn fit_single_loads_first_instance_and_resizes() {
    let tmp = tempfile::tempdir().unwrap();
    write_instance(tmp.path(), "a", 2, 8);
    write_instance(tmp.path(), "b", 2, 8);

    let cfg = DatasetConfig {
        fit_single: true,
        img_sidelength: Some(4),
        ..DatasetConfig::new(tmp.path())
    };
    let ds = SceneClassDataset::load(&cfg).unwrap();
    assert_eq!(ds.num_instances(), 1);
    assert_eq!(ds.num_views(), 2);
    assert_eq!(ds.resolution(), (4, 4));

    let view = ds.view(0, 0).unwrap();
    // intrinsics were written for 8x8
    assert!((view.intrinsics.focal - 4.0).abs() < 1e-5);
    assert!((view.intrinsics.cx - 2.0).abs() < 1e-5);
    assert!(view.rgb.iter().all(|v| (-1.0..=1.0).contains(v)));
    // green channel is saturated
    assert!((view.rgb[1] - 1.0).abs() < 1e-5);
}

#[test]
fn mixed_resolutions_need_resizing() {
    let tmp = tempfile::tempdir().unwrap();
    write_instance(tmp.path(), "a", 1, 8);
    write_instance(tmp.path(), "b", 1, 6);
    let err = SceneClassDataset::load(&DatasetConfig::new(tmp.path())).unwrap_err();
    assert!(matches!(err, DatasetError::ResolutionMismatch { .. }));

    let cfg = DatasetConfig {
        img_sidelength: Some(6),
        ..DatasetConfig::new(tmp.path())
    };
    assert!(SceneClassDataset::load(&cfg).is_ok());
}

#[test]
fn batches_convert_to_tensors() {
    let tmp = tempfile::tempdir().unwrap();
    write_instance(tmp.path(), "a", 2, 4);
    write_instance(tmp.path(), "b", 2, 4);
    let cfg = DatasetConfig {
        max_num_instances: Some(2),
        ..DatasetConfig::new(tmp.path())
    };
    let ds = SceneClassDataset::load(&cfg).unwrap();
    let mut sampler = RaySampler::new(
        &ds,
        SamplerConfig {
            batch_size: 3,
            rays_per_view: Some(5),
            seed: Some(11),
            ..Default::default()
        },
    );
    let batch = sampler.next_batch(&ds).unwrap();
    let device = Default::default();
    let tensors = batch.to_tensors::<NdArray<f32>>(&device);
    assert_eq!(tensors.cam2world.dims(), [3, 1, 4, 4]);
    assert_eq!(tensors.intrinsics.dims(), [3, 1, 3, 3]);
    assert_eq!(tensors.uv.dims(), [3, 1, 5, 2]);
    assert_eq!(tensors.rgb.dims(), [3, 1, 5, 3]);
    assert_eq!(tensors.instance_idx.dims(), [3, 1]);
}

#[test]
fn every_view_of_every_instance_is_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    write_instance(tmp.path(), "a", 3, 4);
    write_instance(tmp.path(), "b", 1, 4);
    let ds = SceneClassDataset::load(&DatasetConfig::new(tmp.path())).unwrap();
    assert_eq!(ds.instance(0).unwrap().views.len(), 3);
    assert_eq!(ds.instance(1).unwrap().views.len(), 1);
    assert_eq!(ds.summary().views, 4);
}
