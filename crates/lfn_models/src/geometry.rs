//! Ray construction and ray embeddings.
//!
//! Shapes: `cam2world [n, 4, 4]`, `intrinsics [n, 3, 3]`, `uv [n, p, 2]`;
//! per-ray outputs are `[n, p, 3]` or `[n, p, 6]`.

use burn::tensor::{backend::Backend, Tensor};

const NORM_EPS: f32 = 1e-12;

fn component<B: Backend>(x: &Tensor<B, 3>, i: usize) -> Tensor<B, 3> {
    let [n, p, _] = x.dims();
    x.clone().slice([0..n, 0..p, i..i + 1])
}

/// Unit vectors along the last dimension.
pub fn normalize<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let norm = x.clone().powf_scalar(2.0).sum_dim(2).sqrt().clamp_min(NORM_EPS);
    x / norm
}

/// Cross product over the last dimension.
pub fn cross<B: Backend>(a: Tensor<B, 3>, b: Tensor<B, 3>) -> Tensor<B, 3> {
    let (ax, ay, az) = (component(&a, 0), component(&a, 1), component(&a, 2));
    let (bx, by, bz) = (component(&b, 0), component(&b, 1), component(&b, 2));
    Tensor::cat(
        vec![
            ay.clone() * bz.clone() - az.clone() * by.clone(),
            az * bx.clone() - ax.clone() * bz,
            ax * by - ay * bx,
        ],
        2,
    )
}

fn dot<B: Backend>(a: Tensor<B, 3>, b: Tensor<B, 3>) -> Tensor<B, 3> {
    (a * b).sum_dim(2)
}

/// Camera centres in world space, `[n, 1, 3]`.
pub fn ray_origins<B: Backend>(cam2world: Tensor<B, 3>) -> Tensor<B, 3> {
    let [n, _, _] = cam2world.dims();
    cam2world.slice([0..n, 0..3, 3..4]).reshape([n, 1, 3])
}

/// World-space unit ray directions through the pixel coordinates `uv`.
pub fn ray_directions<B: Backend>(
    uv: Tensor<B, 3>,
    cam2world: Tensor<B, 3>,
    intrinsics: Tensor<B, 3>,
) -> Tensor<B, 3> {
    let [n, p, _] = uv.dims();
    let k = |r: usize, c: usize| intrinsics.clone().slice([0..n, r..r + 1, c..c + 1]);
    let (fx, fy, cx, cy) = (k(0, 0), k(1, 1), k(0, 2), k(1, 2));

    let x_cam = (component(&uv, 0) - cx) / fx;
    let y_cam = (component(&uv, 1) - cy) / fy;
    let z_cam = Tensor::ones([n, p, 1], &uv.device());
    let dirs_cam = Tensor::cat(vec![x_cam, y_cam, z_cam], 2);

    let rotation_t = cam2world.slice([0..n, 0..3, 0..3]).swap_dims(1, 2);
    normalize(dirs_cam.matmul(rotation_t))
}

/// 6-D Plücker coordinates `(d, o x d)` of every ray.
pub fn plucker_embedding<B: Backend>(
    cam2world: Tensor<B, 3>,
    uv: Tensor<B, 3>,
    intrinsics: Tensor<B, 3>,
) -> Tensor<B, 3> {
    let [_, p, _] = uv.dims();
    let dirs = ray_directions(uv, cam2world.clone(), intrinsics);
    let origins = ray_origins(cam2world).repeat_dim(1, p);
    let moments = cross(origins, dirs.clone());
    Tensor::cat(vec![dirs, moments], 2)
}

/// Near and far intersections of unit-direction rays with a sphere of
/// `radius` around the world origin. Rays that miss the sphere are clamped to
/// their closest point.
pub fn ray_sphere_intersect<B: Backend>(
    origins: Tensor<B, 3>,
    dirs: Tensor<B, 3>,
    radius: f32,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let [_, p, _] = dirs.dims();
    let origins = origins.repeat_dim(1, p);
    let b = dot(origins.clone(), dirs.clone());
    let c = dot(origins.clone(), origins.clone()).sub_scalar(radius * radius);
    let half_chord = (b.clone().powf_scalar(2.0) - c).clamp_min(0.0).sqrt();
    let t_near = b.clone().neg() - half_chord.clone();
    let t_far = b.neg() + half_chord;
    (
        origins.clone() + dirs.clone() * t_near,
        origins + dirs * t_far,
    )
}

/// Both sphere intersections, normalized and concatenated to 6-D.
pub fn sphere_embedding<B: Backend>(
    cam2world: Tensor<B, 3>,
    uv: Tensor<B, 3>,
    intrinsics: Tensor<B, 3>,
    radius: f32,
) -> Tensor<B, 3> {
    let dirs = ray_directions(uv, cam2world.clone(), intrinsics);
    let (near, far) = ray_sphere_intersect(ray_origins(cam2world), dirs, radius);
    Tensor::cat(vec![normalize(near), normalize(far)], 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn values<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn principal_point_looks_down_camera_axis() {
        let device = Default::default();
        let identity: Vec<f32> = (0..16).map(|i| if i % 5 == 0 { 1.0 } else { 0.0 }).collect();
        let pose = Tensor::<TestBackend, 3>::from_data(TensorData::new(identity, [1, 4, 4]), &device);
        let k = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![2.0f32, 0.0, 1.0, 0.0, 2.0, 1.0, 0.0, 0.0, 1.0], [1, 3, 3]),
            &device,
        );
        let uv = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, 1.0, 3.0, 1.0], [1, 2, 2]),
            &device,
        );
        let d = values(ray_directions(uv, pose, k));
        assert!((d[0]).abs() < 1e-6 && (d[1]).abs() < 1e-6 && (d[2] - 1.0).abs() < 1e-6);
        // (1, 0, 1) / sqrt(2)
        let s = std::f32::consts::FRAC_1_SQRT_2;
        assert!((d[3] - s).abs() < 1e-5 && d[4].abs() < 1e-6 && (d[5] - s).abs() < 1e-5);
    }

    #[test]
    fn cross_product_of_axes() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_data(TensorData::new(vec![1.0f32, 0.0, 0.0], [1, 1, 3]), &device);
        let y = Tensor::<TestBackend, 3>::from_data(TensorData::new(vec![0.0f32, 1.0, 0.0], [1, 1, 3]), &device);
        assert_eq!(values(cross(x, y)), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn sphere_hits_lie_on_sphere() {
        let device = Default::default();
        let origins = Tensor::<TestBackend, 3>::from_data(TensorData::new(vec![0.0f32, 0.0, -2.0], [1, 1, 3]), &device);
        let dirs = normalize(Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![0.0f32, 0.0, 1.0, 0.3, -0.2, 1.0], [1, 2, 3]),
            &device,
        ));
        let (near, far) = ray_sphere_intersect(origins, dirs, 10.0);
        for hits in [values(near), values(far)] {
            for p in hits.chunks_exact(3) {
                let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
                assert!((r - 10.0).abs() < 1e-3, "radius {r}");
            }
        }
    }
}
