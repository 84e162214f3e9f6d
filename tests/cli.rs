use assert_cmd::prelude::*;
use predicates::str::{contains, is_match};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const SCENE_OBJ: &str = "mtllib scene.mtl
o floor
v -2 0 -2
v 2 0 -2
v 2 0 2
v -2 0 2
usemtl white
f 1 3 2
f 1 4 3
o wall
v -2 0 -2
v -2 2 -2
v 2 2 -2
v 2 0 -2
usemtl red
f 5 7 6
f 5 8 7
";

const SCENE_MTL: &str = "newmtl white
Kd 0.8 0.8 0.8
Ks 0 0 0
Ns 10

newmtl red
Kd 0.9 0.1 0.1
Ks 0 0 0
Ns 10
";

const SMALL_CONFIG: &str = "[window]
width = 32
height = 24
render_scale = 1.0

[shadow]
resolution = 64

[cones]
diffuse_count = 4

[camera]
position = [0.0, 1.0, 6.0]
yaw = -90.0
pitch = -5.0
";

fn write_scene() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let obj = dir.path().join("scene.obj");
    fs::write(&obj, SCENE_OBJ).expect("write obj");
    fs::write(dir.path().join("scene.mtl"), SCENE_MTL).expect("write mtl");
    let config = dir.path().join("small.toml");
    fs::write(&config, SMALL_CONFIG).expect("write config");
    (dir, obj, config)
}

#[test]
fn headless_run_prints_scene_and_frame_summary() {
    let (_dir, obj, config) = write_scene();
    let mut cmd = Command::cargo_bin("vct-renderer").expect("binary exists");
    cmd.arg(&obj)
        .arg("--config")
        .arg(&config)
        .arg("--voxel-dim")
        .arg("16")
        .arg("--headless")
        .arg("--frames")
        .arg("2");
    cmd.assert()
        .success()
        .stdout(contains(
            "Loaded scene with 2 batches, 4 triangles, 2 materials, 0 textures",
        ))
        .stdout(is_match(r"Voxel grid 16x16x16: [1-9]\d* occupied voxels, 5 mip levels").unwrap())
        .stdout(is_match(r"Frame 0: 32x24, mean luminance \d\.\d{4}, [1-9]\d* covered pixels").unwrap())
        .stdout(contains("Frame 1: 32x24"));
}

#[test]
fn non_power_of_two_voxel_dim_fails_fast() {
    let (_dir, obj, _config) = write_scene();
    let mut cmd = Command::cargo_bin("vct-renderer").expect("binary exists");
    cmd.arg(&obj).arg("--voxel-dim").arg("3").arg("--headless");
    cmd.assert()
        .failure()
        .stderr(contains("invalid configuration"))
        .stderr(contains("power of two"));
}

#[test]
fn missing_scene_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut cmd = Command::cargo_bin("vct-renderer").expect("binary exists");
    cmd.arg(dir.path().join("absent.obj"))
        .arg("--voxel-dim")
        .arg("16")
        .arg("--headless");
    cmd.assert()
        .failure()
        .stderr(contains("failed to prepare"));
}
