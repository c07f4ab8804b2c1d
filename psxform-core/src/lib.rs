pub mod errors {
    use thiserror::Error;

    /// 纯几何运算可能出现的错误。全部视为当前操作的致命错误，不做近似回退。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum GeometryError {
        #[error("transform is singular and cannot be inverted: {description}")]
        SingularTransform { description: String },
        #[error("direction vector has near-zero length")]
        DegenerateDirection,
        #[error("invalid rectangle dimensions: width={width}, height={height}")]
        InvalidRectangleDimensions { width: f64, height: f64 },
        #[error("rectangle center must be finite: ({x}, {y})")]
        InvalidRectangleCenter { x: f64, y: f64 },
        #[error("entity cannot be transformed by a non-uniform scale")]
        NonUniformScale,
    }
}

pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    use crate::errors::GeometryError;

    /// 二维点，内部以 `glam::DVec2` 表示，全程双精度。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        /// 提升为 z = 0 的三维点。
        #[inline]
        pub fn to_point3(self) -> Point3 {
            Point3::new(self.0.x, self.0.y, 0.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 三维点。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        pub const ORIGIN: Point3 = Point3(DVec3::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn vector_to(self, other: Point3) -> Vector3 {
            Vector3(other.0 - self.0)
        }

        /// 丢弃 z 分量。
        #[inline]
        pub fn to_point2(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn distance(self, other: Point3) -> f64 {
            self.0.distance(other.0)
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 三维向量，用于视线方向、位移与旋转轴。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        pub const X: Vector3 = Vector3(DVec3::X);
        pub const Y: Vector3 = Vector3(DVec3::Y);
        pub const Z: Vector3 = Vector3(DVec3::Z);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        /// 单位化；长度接近零时返回 `DegenerateDirection`。
        #[inline]
        pub fn normalize(self) -> Result<Self, GeometryError> {
            let len = self.0.length();
            if !len.is_finite() || len <= 1e-12 {
                Err(GeometryError::DegenerateDirection)
            } else {
                Ok(Self(self.0 / len))
            }
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐包围盒。只能由点集推导得到，不对外提供直接构造。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BoundingBox {
        min: Point2,
        max: Point2,
    }

    impl BoundingBox {
        /// 以单点初始化的退化包围盒。
        #[inline]
        pub fn from_point(point: Point2) -> Self {
            Self {
                min: point,
                max: point,
            }
        }

        /// 对点集逐轴做 min/max 归约；空集合返回 `None`。
        pub fn from_points<I>(points: I) -> Option<Self>
        where
            I: IntoIterator<Item = Point2>,
        {
            let mut iter = points.into_iter();
            let first = iter.next()?;
            let mut bounds = Self::from_point(first);
            for point in iter {
                bounds.include_point(point);
            }
            Some(bounds)
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            self.min = Point2::from_vec(self.min.as_vec2().min(point.as_vec2()));
            self.max = Point2::from_vec(self.max.as_vec2().max(point.as_vec2()));
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            Point2::from_vec((self.min.as_vec2() + self.max.as_vec2()) * 0.5)
        }
    }

    /// 以中心点与宽高描述的轴对齐矩形（页面/屏幕空间）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Rectangle {
        center: Point2,
        width: f64,
        height: f64,
    }

    /// 矩形四角，逆时针，从左下角开始：`[左下, 右下, 右上, 左上]`。
    pub type Corners = [Point2; 4];

    impl Rectangle {
        /// 中心点必须有限；宽高必须严格为正（NaN 同样拒绝），不做静默截断。
        pub fn new(center: Point2, width: f64, height: f64) -> Result<Self, GeometryError> {
            if !center.as_vec2().is_finite() {
                return Err(GeometryError::InvalidRectangleCenter {
                    x: center.x(),
                    y: center.y(),
                });
            }
            // `!(x > 0.0)` 同时拦截 NaN
            if !(width > 0.0) || !(height > 0.0) {
                return Err(GeometryError::InvalidRectangleDimensions { width, height });
            }
            Ok(Self {
                center,
                width,
                height,
            })
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            self.center
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.width
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.height
        }

        /// 返回四角，顺序固定为逆时针，从左下角开始。
        pub fn corners(&self) -> Corners {
            let half_w = self.width / 2.0;
            let half_h = self.height / 2.0;
            let (cx, cy) = (self.center.x(), self.center.y());
            [
                Point2::new(cx - half_w, cy - half_h),
                Point2::new(cx + half_w, cy - half_h),
                Point2::new(cx + half_w, cy + half_h),
                Point2::new(cx - half_w, cy + half_h),
            ]
        }
    }

    /// 由中心点与宽高直接求四角。
    pub fn rectangle_corners(
        center: Point2,
        width: f64,
        height: f64,
    ) -> Result<Corners, GeometryError> {
        Rectangle::new(center, width, height).map(|rect| rect.corners())
    }

}

pub mod transform {
    use std::fmt;
    use std::ops::Mul;

    use glam::{DMat4, DVec3};
    use serde::{Deserialize, Serialize};

    use crate::errors::GeometryError;
    use crate::geometry::{Point3, Vector3};

    /// 相对奇异阈值：`|det|` 不超过 `SINGULAR_EPSILON * L³` 时视为奇异，
    /// `L` 为线性部分最长列向量的长度。
    pub const SINGULAR_EPSILON: f64 = 1e-12;

    /// 任意轴算法的阈值（1/64），与 DXF 约定一致。
    const ARBITRARY_AXIS_LIMIT: f64 = 1.0 / 64.0;

    /// 三维仿射变换，内部为列主序 `DMat4`，点按列向量右乘。
    ///
    /// 组合顺序：`compose(outer, inner)` 先应用 `inner` 再应用 `outer`，
    /// 等价于矩阵乘积 `outer * inner`。组合满足结合律但不满足交换律。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct AffineTransform(DMat4);

    impl AffineTransform {
        pub const IDENTITY: AffineTransform = AffineTransform(DMat4::IDENTITY);

        #[inline]
        pub fn from_matrix(matrix: DMat4) -> Self {
            Self(matrix)
        }

        /// 从 16 个列主序元素构造，用于无损反序列化。
        #[inline]
        pub fn from_cols_array(values: &[f64; 16]) -> Self {
            Self(DMat4::from_cols_array(values))
        }

        #[inline]
        pub fn to_cols_array(&self) -> [f64; 16] {
            self.0.to_cols_array()
        }

        /// 平移。
        #[inline]
        pub fn displacement(offset: Vector3) -> Self {
            Self(DMat4::from_translation(offset.as_vec3()))
        }

        /// 以 `center` 为不动点的等比缩放。
        pub fn scaling(factor: f64, center: Point3) -> Self {
            let c = center.as_vec3();
            Self(
                DMat4::from_translation(c)
                    * DMat4::from_scale(DVec3::splat(factor))
                    * DMat4::from_translation(-c),
            )
        }

        /// 绕过 `center`、方向为 `axis` 的轴按右手法则旋转 `angle` 弧度。
        pub fn rotation(angle: f64, axis: Vector3, center: Point3) -> Result<Self, GeometryError> {
            let axis = axis.normalize()?;
            let c = center.as_vec3();
            Ok(Self(
                DMat4::from_translation(c)
                    * DMat4::from_axis_angle(axis.as_vec3(), angle)
                    * DMat4::from_translation(-c),
            ))
        }

        /// 以 `normal` 为法向、过原点的平面坐标系到世界坐标系的变换。
        ///
        /// X 轴按任意轴算法选取：法向接近 Z 轴时用 `Y × N`，否则用 `Z × N`。
        pub fn plane_to_world(normal: Vector3) -> Result<Self, GeometryError> {
            let n = normal.normalize()?.as_vec3();
            let x_axis = if n.x.abs() < ARBITRARY_AXIS_LIMIT && n.y.abs() < ARBITRARY_AXIS_LIMIT {
                DVec3::Y.cross(n)
            } else {
                DVec3::Z.cross(n)
            }
            .normalize();
            let y_axis = n.cross(x_axis).normalize();
            Ok(Self(DMat4::from_cols(
                x_axis.extend(0.0),
                y_axis.extend(0.0),
                n.extend(0.0),
                glam::DVec4::W,
            )))
        }

        /// 返回先应用 `inner`、再应用 `outer` 的变换。
        #[inline]
        pub fn compose(outer: &AffineTransform, inner: &AffineTransform) -> AffineTransform {
            Self(outer.0 * inner.0)
        }

        /// 求逆；行列式相对线性部分的量级接近零时返回 `SingularTransform`，附带矩阵描述。
        ///
        /// 阈值随矩阵尺度变化，1:10000 之类的小比例等比缩放仍可求逆。
        pub fn invert(&self) -> Result<Self, GeometryError> {
            let det = self.0.determinant();
            let longest = self
                .0
                .x_axis
                .truncate()
                .length()
                .max(self.0.y_axis.truncate().length())
                .max(self.0.z_axis.truncate().length());
            let singular = !det.is_finite()
                || !(longest > 0.0)
                || det.abs() <= SINGULAR_EPSILON * longest.powi(3);
            if singular {
                return Err(self.singular());
            }
            let inverse = self.0.inverse();
            if !inverse.is_finite() {
                return Err(self.singular());
            }
            Ok(Self(inverse))
        }

        fn singular(&self) -> GeometryError {
            GeometryError::SingularTransform {
                description: self.to_string(),
            }
        }

        /// 以齐次坐标 w = 1 变换点。
        #[inline]
        pub fn apply(&self, point: Point3) -> Point3 {
            Point3(self.0.transform_point3(point.as_vec3()))
        }

        /// 变换方向向量（忽略平移）。
        #[inline]
        pub fn apply_vector(&self, vector: Vector3) -> Vector3 {
            Vector3(self.0.transform_vector3(vector.as_vec3()))
        }

        /// 若线性部分是"正交 × 等比缩放"，返回缩放因子。
        pub fn uniform_scale(&self) -> Option<f64> {
            let x = self.0.x_axis.truncate();
            let y = self.0.y_axis.truncate();
            let z = self.0.z_axis.truncate();
            let sx = x.length();
            if !(sx > 0.0) {
                return None;
            }
            let tolerance = 1e-9 * sx.max(1.0);
            let same_length =
                (y.length() - sx).abs() <= tolerance && (z.length() - sx).abs() <= tolerance;
            let orthogonal = x.dot(y).abs() <= tolerance * sx
                && y.dot(z).abs() <= tolerance * sx
                && z.dot(x).abs() <= tolerance * sx;
            if same_length && orthogonal {
                Some(sx)
            } else {
                None
            }
        }

        #[inline]
        pub fn abs_diff_eq(&self, other: &AffineTransform, max_abs_diff: f64) -> bool {
            self.0.abs_diff_eq(other.0, max_abs_diff)
        }
    }

    impl Default for AffineTransform {
        fn default() -> Self {
            Self::IDENTITY
        }
    }

    impl Mul for AffineTransform {
        type Output = AffineTransform;

        fn mul(self, rhs: AffineTransform) -> AffineTransform {
            AffineTransform::compose(&self, &rhs)
        }
    }

    impl fmt::Display for AffineTransform {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let rows = [self.0.row(0), self.0.row(1), self.0.row(2), self.0.row(3)];
            let text: Vec<String> = rows
                .iter()
                .map(|row| format!("[{}, {}, {}, {}]", row.x, row.y, row.z, row.w))
                .collect();
            write!(f, "[{}]", text.join(", "))
        }
    }

}

pub mod view {
    use serde::{Deserialize, Serialize};

    use crate::errors::GeometryError;
    use crate::geometry::{Point2, Point3, Vector3};
    use crate::transform::AffineTransform;

    /// 图纸空间总览视口（图纸本身）的保留编号。
    pub const OVERVIEW_VIEWPORT_NUMBER: i32 = 1;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct ViewportId(u64);

    impl ViewportId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 解析瞬间的视图快照。每次解析重新获取，不跨调用缓存。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct ViewDescriptor {
        pub target: Point3,
        pub view_direction: Vector3,
        /// 绕视线方向的扭转角（弧度）。
        pub twist: f64,
        /// 模型单位到图纸单位的比例。
        pub custom_scale: f64,
        /// 视口中心在图纸空间中的位置。
        pub center_point: Point2,
        /// 视图中心在 DCS 中的位置。
        pub view_center: Point2,
    }

    impl ViewDescriptor {
        /// 俯视（+Z）、无扭转、比例 1 的视图。
        pub fn plan(target: Point3) -> Self {
            Self {
                target,
                view_direction: Vector3::Z,
                twist: 0.0,
                custom_scale: 1.0,
                center_point: Point2::new(0.0, 0.0),
                view_center: Point2::new(0.0, 0.0),
            }
        }
    }

    /// 图纸上的视口记录。编号为 [`OVERVIEW_VIEWPORT_NUMBER`] 的是图纸本身。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Viewport {
        pub id: ViewportId,
        pub number: i32,
        pub view: ViewDescriptor,
    }

    impl Viewport {
        #[inline]
        pub fn is_overview(&self) -> bool {
            self.number == OVERVIEW_VIEWPORT_NUMBER
        }
    }

    /// DCS→WCS = Rotation(-twist, dir, target) ∘ Displacement(target - origin) ∘ PlaneToWorld(dir)。
    pub fn dcs_to_wcs(view: &ViewDescriptor) -> Result<AffineTransform, GeometryError> {
        let rotation = AffineTransform::rotation(-view.twist, view.view_direction, view.target)?;
        let displacement = AffineTransform::displacement(Point3::ORIGIN.vector_to(view.target));
        let plane = AffineTransform::plane_to_world(view.view_direction)?;
        Ok(AffineTransform::compose(
            &AffineTransform::compose(&rotation, &displacement),
            &plane,
        ))
    }

    /// DCS→PSDCS = Scaling(customScale, centerPoint) ∘ Displacement(centerPoint - viewCenter)。
    pub fn dcs_to_psdcs(view: &ViewDescriptor) -> AffineTransform {
        let center = view.center_point.to_point3();
        let view_center = view.view_center.to_point3();
        AffineTransform::compose(
            &AffineTransform::scaling(view.custom_scale, center),
            &AffineTransform::displacement(view_center.vector_to(center)),
        )
    }

    #[inline]
    pub fn psdcs_to_dcs(view: &ViewDescriptor) -> Result<AffineTransform, GeometryError> {
        dcs_to_psdcs(view).invert()
    }

    /// 图纸空间显示坐标到世界坐标：`DCS→WCS ∘ PSDCS→DCS`。
    pub fn psdcs_to_wcs(view: &ViewDescriptor) -> Result<AffineTransform, GeometryError> {
        let psdcs_to_dcs = psdcs_to_dcs(view)?;
        let dcs_to_wcs = dcs_to_wcs(view)?;
        Ok(AffineTransform::compose(&dcs_to_wcs, &psdcs_to_dcs))
    }

    #[cfg(test)]
    mod tests {
        use std::f64::consts::FRAC_PI_2;

        use super::*;

        fn assert_point(actual: Point3, x: f64, y: f64, z: f64) {
            assert!(
                actual.distance(Point3::new(x, y, z)) < 1e-9,
                "expected ({x}, {y}, {z}), got {actual:?}"
            );
        }

        #[test]
        fn plan_view_maps_paper_origin_to_target() {
            let view = ViewDescriptor {
                custom_scale: 2.0,
                ..ViewDescriptor::plan(Point3::new(5.0, 5.0, 0.0))
            };
            let xform = psdcs_to_wcs(&view).unwrap();
            assert_point(xform.apply(Point3::ORIGIN), 5.0, 5.0, 0.0);
            // 图纸上 1 个单位对应模型中 1/customScale
            assert_point(xform.apply(Point3::new(2.0, 0.0, 0.0)), 6.0, 5.0, 0.0);
        }

        #[test]
        fn paper_center_maps_to_view_center() {
            let view = ViewDescriptor {
                target: Point3::ORIGIN,
                view_direction: Vector3::Z,
                twist: 0.0,
                custom_scale: 0.5,
                center_point: Point2::new(100.0, 50.0),
                view_center: Point2::new(20.0, 30.0),
            };
            let to_dcs = psdcs_to_dcs(&view).unwrap();
            assert_point(to_dcs.apply(Point3::new(100.0, 50.0, 0.0)), 20.0, 30.0, 0.0);
            assert_point(to_dcs.apply(Point3::new(101.0, 50.0, 0.0)), 22.0, 30.0, 0.0);
        }

        #[test]
        fn twist_rotates_display_frame_clockwise_in_world() {
            let view = ViewDescriptor {
                twist: FRAC_PI_2,
                ..ViewDescriptor::plan(Point3::ORIGIN)
            };
            let xform = dcs_to_wcs(&view).unwrap();
            // 扭转 +90° 后，显示坐标 +X 指向世界 -Y
            assert_point(xform.apply(Point3::new(1.0, 0.0, 0.0)), 0.0, -1.0, 0.0);
        }

        #[test]
        fn small_scale_viewports_resolve() {
            for scale in [1e-4, 1e-6] {
                let view = ViewDescriptor {
                    custom_scale: scale,
                    ..ViewDescriptor::plan(Point3::new(5.0, 5.0, 0.0))
                };
                let xform = psdcs_to_wcs(&view).expect("small scale is not singular");
                assert_point(xform.apply(Point3::ORIGIN), 5.0, 5.0, 0.0);
                let mapped = xform.apply(Point3::new(1.0, 0.0, 0.0));
                let expected = Point3::new(5.0 + 1.0 / scale, 5.0, 0.0);
                assert!(mapped.distance(expected) < 1e-6, "{scale}: {mapped:?}");
            }
        }

        #[test]
        fn zero_custom_scale_is_singular() {
            let view = ViewDescriptor {
                custom_scale: 0.0,
                ..ViewDescriptor::plan(Point3::ORIGIN)
            };
            assert!(matches!(
                psdcs_to_wcs(&view),
                Err(GeometryError::SingularTransform { .. })
            ));
        }

        #[test]
        fn zero_view_direction_is_degenerate() {
            let view = ViewDescriptor {
                view_direction: Vector3::new(0.0, 0.0, 0.0),
                ..ViewDescriptor::plan(Point3::ORIGIN)
            };
            assert_eq!(dcs_to_wcs(&view), Err(GeometryError::DegenerateDirection));
        }
    }
}

pub mod projection {
    use crate::geometry::{BoundingBox, Corners, Point2};
    use crate::transform::AffineTransform;

    /// 将页面空间四角（z = 0）逐个变换到模型空间，只保留 XY。
    pub fn transform_corners(corners: &Corners, page_to_model: &AffineTransform) -> Corners {
        corners.map(|corner| page_to_model.apply(corner.to_point3()).to_point2())
    }

    /// 先逐角变换再求包围盒；带旋转时与"先求包围盒再变换"并不等价。
    pub fn project_corners(corners: &Corners, page_to_model: &AffineTransform) -> BoundingBox {
        let [first, rest @ ..] = transform_corners(corners, page_to_model);
        let mut bounds = BoundingBox::from_point(first);
        for point in rest {
            bounds.include_point(point);
        }
        bounds
    }

    /// 任意点集版本，空集合返回 `None`。
    pub fn project_points<I>(points: I, page_to_model: &AffineTransform) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = Point2>,
    {
        BoundingBox::from_points(
            points
                .into_iter()
                .map(|point| page_to_model.apply(point.to_point3()).to_point2()),
        )
    }

    #[cfg(test)]
    mod tests {
        use std::f64::consts::FRAC_PI_4;

        use super::*;
        use crate::geometry::{Point3, Vector3};

        #[test]
        fn scale_and_translate_projects_to_expected_box() {
            let corners = [
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 0.0),
                Point2::new(2.0, 1.0),
                Point2::new(0.0, 1.0),
            ];
            let xform = AffineTransform::displacement(Vector3::new(10.0, 10.0, 0.0))
                * AffineTransform::scaling(3.0, Point3::ORIGIN);
            let bounds = project_corners(&corners, &xform);
            assert!((bounds.min().x() - 10.0).abs() < 1e-9);
            assert!((bounds.min().y() - 10.0).abs() < 1e-9);
            assert!((bounds.max().x() - 16.0).abs() < 1e-9);
            assert!((bounds.max().y() - 13.0).abs() < 1e-9);
        }

        #[test]
        fn rotation_transforms_corners_before_reducing() {
            let corners = [
                Point2::new(-1.0, -1.0),
                Point2::new(1.0, -1.0),
                Point2::new(1.0, 1.0),
                Point2::new(-1.0, 1.0),
            ];
            let rot = AffineTransform::rotation(FRAC_PI_4, Vector3::Z, Point3::ORIGIN).unwrap();
            let bounds = project_corners(&corners, &rot);
            let half_diag = 2.0_f64.sqrt();
            assert!((bounds.max().x() - half_diag).abs() < 1e-9);
            assert!((bounds.min().y() + half_diag).abs() < 1e-9);
        }

        #[test]
        fn collapsing_transform_yields_degenerate_box() {
            let corners = [
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 0.0),
                Point2::new(2.0, 1.0),
                Point2::new(0.0, 1.0),
            ];
            let collapse = AffineTransform::scaling(0.0, Point3::new(4.0, 4.0, 0.0));
            let bounds = project_corners(&corners, &collapse);
            assert_eq!(bounds.min(), bounds.max());
            assert!(project_points(std::iter::empty::<Point2>(), &collapse).is_none());
        }
    }
}

pub mod entity {
    use serde::{Deserialize, Serialize};

    use crate::errors::GeometryError;
    use crate::geometry::{Point3, Vector3};
    use crate::transform::AffineTransform;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// ACI 颜色索引。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ColorIndex(pub u8);

    impl ColorIndex {
        pub const GREEN: ColorIndex = ColorIndex(3);
    }

    /// 实体所在空间。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Space {
        Model,
        Paper,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point3>,
        pub is_closed: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point3,
        pub radius: f64,
        pub normal: Vector3,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point3,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "lowercase")]
    pub enum Shape {
        Line(Line),
        Polyline(Polyline),
        Circle(Circle),
        Text(Text),
    }

    /// 几何载荷：形状加图层/颜色等外观属性。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Entity {
        pub shape: Shape,
        pub layer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub color: Option<ColorIndex>,
    }

    impl Entity {
        pub fn new(shape: Shape, layer: impl Into<String>) -> Self {
            Self {
                shape,
                layer: layer.into(),
                color: None,
            }
        }

        pub fn line(start: Point3, end: Point3, layer: impl Into<String>) -> Self {
            Self::new(Shape::Line(Line { start, end }), layer)
        }

        pub fn polyline<I>(vertices: I, is_closed: bool, layer: impl Into<String>) -> Self
        where
            I: IntoIterator<Item = Point3>,
        {
            Self::new(
                Shape::Polyline(Polyline {
                    vertices: vertices.into_iter().collect(),
                    is_closed,
                }),
                layer,
            )
        }

        pub fn circle(center: Point3, radius: f64, layer: impl Into<String>) -> Self {
            Self::new(
                Shape::Circle(Circle {
                    center,
                    radius: radius.abs(),
                    normal: Vector3::Z,
                }),
                layer,
            )
        }

        pub fn text(
            insert: Point3,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> Self {
            Self::new(
                Shape::Text(Text {
                    insert,
                    content: content.into(),
                    height,
                    rotation,
                }),
                layer,
            )
        }

        #[inline]
        pub fn with_color(mut self, color: ColorIndex) -> Self {
            self.color = Some(color);
            self
        }

        /// 控制点列表；圆只返回圆心。
        pub fn control_points(&self) -> Vec<Point3> {
            match &self.shape {
                Shape::Line(line) => vec![line.start, line.end],
                Shape::Polyline(polyline) => polyline.vertices.clone(),
                Shape::Circle(circle) => vec![circle.center],
                Shape::Text(text) => vec![text.insert],
            }
        }

        /// 生成变换后的副本，源实体保持不变。
        ///
        /// 圆与文字要求等比变换，否则返回 `NonUniformScale`。
        pub fn transformed(&self, xform: &AffineTransform) -> Result<Entity, GeometryError> {
            let shape = match &self.shape {
                Shape::Line(line) => Shape::Line(Line {
                    start: xform.apply(line.start),
                    end: xform.apply(line.end),
                }),
                Shape::Polyline(polyline) => Shape::Polyline(Polyline {
                    vertices: polyline.vertices.iter().map(|v| xform.apply(*v)).collect(),
                    is_closed: polyline.is_closed,
                }),
                Shape::Circle(circle) => {
                    let scale = xform.uniform_scale().ok_or(GeometryError::NonUniformScale)?;
                    Shape::Circle(Circle {
                        center: xform.apply(circle.center),
                        radius: circle.radius * scale,
                        normal: xform.apply_vector(circle.normal).normalize()?,
                    })
                }
                Shape::Text(text) => {
                    let scale = xform.uniform_scale().ok_or(GeometryError::NonUniformScale)?;
                    let direction = xform.apply_vector(Vector3::new(
                        text.rotation.cos(),
                        text.rotation.sin(),
                        0.0,
                    ));
                    Shape::Text(Text {
                        insert: xform.apply(text.insert),
                        content: text.content.clone(),
                        height: text.height * scale,
                        rotation: direction.0.y.atan2(direction.0.x),
                    })
                }
            };
            Ok(Entity {
                shape,
                layer: self.layer.clone(),
                color: self.color,
            })
        }
    }

    /// 变换得到的新实体及其所用变换。创建后交由调用方，核心不再持有。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TransformedGeometry {
        pub source: EntityId,
        pub entity: Entity,
        pub transform: AffineTransform,
    }

    #[cfg(test)]
    mod tests {
        use std::f64::consts::FRAC_PI_2;

        use glam::{DMat4, DVec3};

        use super::*;

        #[test]
        fn transformed_copy_leaves_source_untouched() {
            let source = Entity::polyline(
                [
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(1.0, 1.0, 0.0),
                ],
                true,
                "MARKUP",
            );
            let snapshot = source.clone();
            let shift = AffineTransform::displacement(Vector3::new(5.0, -2.0, 0.0));
            let copy = source.transformed(&shift).unwrap();

            assert_eq!(source, snapshot);
            assert_eq!(
                copy.control_points(),
                vec![
                    Point3::new(5.0, -2.0, 0.0),
                    Point3::new(6.0, -2.0, 0.0),
                    Point3::new(6.0, -1.0, 0.0),
                ]
            );
            assert_eq!(copy.layer, "MARKUP");
        }

        #[test]
        fn circle_and_text_scale_lengths_uniformly() {
            let xform = AffineTransform::rotation(FRAC_PI_2, Vector3::Z, Point3::ORIGIN).unwrap()
                * AffineTransform::scaling(0.5, Point3::ORIGIN);

            let circle = Entity::circle(Point3::new(2.0, 0.0, 0.0), 4.0, "0")
                .transformed(&xform)
                .unwrap();
            match circle.shape {
                Shape::Circle(c) => {
                    assert!((c.radius - 2.0).abs() < 1e-12);
                    assert!(c.center.distance(Point3::new(0.0, 1.0, 0.0)) < 1e-12);
                }
                other => panic!("expected circle, got {other:?}"),
            }

            let text = Entity::text(Point3::ORIGIN, "NOTE", 2.5, 0.0, "0")
                .transformed(&xform)
                .unwrap();
            match text.shape {
                Shape::Text(t) => {
                    assert!((t.height - 1.25).abs() < 1e-12);
                    assert!((t.rotation - FRAC_PI_2).abs() < 1e-12);
                }
                other => panic!("expected text, got {other:?}"),
            }
        }

        #[test]
        fn circle_rejects_non_uniform_scale() {
            let stretch =
                AffineTransform::from_matrix(DMat4::from_scale(DVec3::new(2.0, 1.0, 1.0)));
            let err = Entity::circle(Point3::ORIGIN, 1.0, "0")
                .transformed(&stretch)
                .unwrap_err();
            assert_eq!(err, GeometryError::NonUniformScale);

            // 直线可以任意仿射
            assert!(
                Entity::line(Point3::ORIGIN, Point3::new(1.0, 1.0, 0.0), "0")
                    .transformed(&stretch)
                    .is_ok()
            );
        }
    }
}
