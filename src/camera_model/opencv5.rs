use super::generic::CameraModel;
use nalgebra as na;

/// Pinhole model with OpenCV's five-term distortion `(k1, k2, p1, p2, k3)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenCVModel5<T: na::RealField + Clone> {
    pub fx: T,
    pub fy: T,
    pub cx: T,
    pub cy: T,
    pub k1: T,
    pub k2: T,
    pub p1: T,
    pub p2: T,
    pub k3: T,
}

impl<T: na::RealField + Clone> OpenCVModel5<T> {
    /// `params` is `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
    pub fn new(params: &na::DVector<T>) -> OpenCVModel5<T> {
        OpenCVModel5 {
            fx: params[0].clone(),
            fy: params[1].clone(),
            cx: params[2].clone(),
            cy: params[3].clone(),
            k1: params[4].clone(),
            k2: params[5].clone(),
            p1: params[6].clone(),
            p2: params[7].clone(),
            k3: params[8].clone(),
        }
    }

    /// Applies lens distortion to normalized image coordinates.
    pub fn distort(&self, x: T, y: T) -> (T, T) {
        let two: T = na::convert(2.0);
        let r2 = x.clone() * x.clone() + y.clone() * y.clone();
        let r4 = r2.clone() * r2.clone();
        let r6 = r4.clone() * r2.clone();
        let radial = T::one()
            + self.k1.clone() * r2.clone()
            + self.k2.clone() * r4
            + self.k3.clone() * r6;
        let xy = x.clone() * y.clone();
        let xd = x.clone() * radial.clone()
            + two.clone() * self.p1.clone() * xy.clone()
            + self.p2.clone() * (r2.clone() + two.clone() * x.clone() * x);
        let yd = y.clone() * radial
            + self.p1.clone() * (r2 + two.clone() * y.clone() * y)
            + two * self.p2.clone() * xy;
        (xd, yd)
    }

    fn project_one_impl(&self, pt: &na::Vector3<T>) -> na::Vector2<T> {
        let x = pt[0].clone() / pt[2].clone();
        let y = pt[1].clone() / pt[2].clone();
        let (xd, yd) = self.distort(x, y);
        na::Vector2::new(
            self.fx.clone() * xd + self.cx.clone(),
            self.fy.clone() * yd + self.cy.clone(),
        )
    }
}

impl<T: na::RealField + Clone> CameraModel<T> for OpenCVModel5<T> {
    fn params(&self) -> na::DVector<T> {
        na::dvector![
            self.fx.clone(),
            self.fy.clone(),
            self.cx.clone(),
            self.cy.clone(),
            self.k1.clone(),
            self.k2.clone(),
            self.p1.clone(),
            self.p2.clone(),
            self.k3.clone()
        ]
    }
    fn project_one(&self, pt: &na::Vector3<T>) -> na::Vector2<T> {
        self.project_one_impl(pt)
    }
}
