use serde::{
    Deserialize,
    Serialize
};

pub type Vector2F = Vector2X<f32>;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vector2X<T> {
    pub x: T,
    pub y: T,
}

pub type Rect2F = Rect2X<f32>;

/// Axis aligned rectangle, `pos` is the upper left corner.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rect2X<T> {
    pub pos: Vector2X<T>,
    pub size: Vector2X<T>,
}

impl<T: std::fmt::Display> std::fmt::Display for Vector2X<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.x, self.y)
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Rect2X<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[({},{}), ({},{})]", self.pos.x, self.pos.y, self.size.x, self.size.y)
    }
}

impl<T> Vector2X<T>
where
    T: Default
{
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: T::default(), y: T::default() }
    }
}

impl Vector2X<f32> {
    pub fn length_squared(&self) -> f32 {
        self.x.powi(2) + self.y.powi(2)
    }

    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(&self, other: Self) -> f32 {
        (*self - other).length()
    }

    pub fn dot(&self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    /// Signed angle in radians from `self` to `rhs`.
    pub fn angle_to(&self, rhs: Self) -> f32 {
        let cross = self.x * rhs.y - self.y * rhs.x;
        cross.atan2(self.dot(rhs))
    }
}

impl<T> std::ops::Add for Vector2X<T>
where
    T: std::ops::Add<Output = T>
{
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y
        }
    }
}

impl<T> std::ops::AddAssign for Vector2X<T>
where
    T: std::ops::AddAssign
{
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl<T> std::ops::Sub for Vector2X<T>
where
    T: std::ops::Sub<Output = T>
{
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: T::sub(self.x, rhs.x),
            y: T::sub(self.y, rhs.y)
        }
    }
}

impl<T> std::ops::Mul<T> for Vector2X<T>
where
    T: std::ops::Mul<Output = T> + Copy
{
    type Output = Self;
    fn mul(self, rhs: T) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs
        }
    }
}

impl From<Vector2F> for glam::Vec2 {
    fn from(value: Vector2F) -> Self {
        glam::Vec2::new(value.x, value.y)
    }
}

impl From<glam::Vec2> for Vector2F {
    fn from(value: glam::Vec2) -> Self {
        Self { x: value.x, y: value.y }
    }
}

impl<T> Rect2X<T> {
    pub fn new(x: T, y: T, w: T, h: T) -> Self {
        Self { pos: Vector2X { x, y }, size: Vector2X { x: w, y: h } }
    }
}

impl Rect2X<f32> {
    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    pub fn x2(&self) -> f32 {
        self.pos.x + self.size.x
    }

    pub fn y2(&self) -> f32 {
        self.pos.y + self.size.y
    }

    pub fn upper_left(&self) -> Vector2F {
        self.pos
    }

    /// A rect with positive extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.size.x > 0.0 && self.size.y > 0.0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.size.y > 0.0 {
            self.size.x / self.size.y
        } else {
            1.0
        }
    }
}

impl<T> Rect2X<T>
where
    T: PartialOrd + std::ops::Add<Output = T> + Copy
{
    pub fn contains(&self, point: &Vector2X<T>) -> bool {
        point.x >= self.pos.x
            && point.y >= self.pos.y
            && point.x < self.pos.x + self.size.x
            && point.y < self.pos.y + self.size.y
    }
}

#[test]
fn test_vector_distance() {
    let v1 = Vector2F::new(100.0, 100.0);
    let v2 = Vector2F::new(103.0, 104.0);
    assert_eq!(v1.distance(v2), 5.0);
}

#[test]
fn test_vector_angle_to() {
    let v1 = Vector2F::new(1.0, 0.0);
    let v2 = Vector2F::new(0.0, 1.0);
    assert!((v1.angle_to(v2) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    assert!((v2.angle_to(v1) + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
}

#[test]
fn test_rect_edges() {
    let rect = Rect2F::new(10.0, 20.0, 640.0, 400.0);
    assert_eq!(rect.x2(), 650.0);
    assert_eq!(rect.y2(), 420.0);
    assert_eq!(rect.aspect_ratio(), 1.6);
    assert!(rect.is_valid());
    assert!(!Rect2F::new(0.0, 0.0, -1.0, -1.0).is_valid());
}

#[test]
fn test_rect_containing() {
    let position = Vector2F::new(1.0, 0.0);
    let size = Vector2F::new(3.0, 5.0);
    let rect = Rect2X::new(position.x, position.y, size.x, size.y);

    let p1_inside = position;
    let p2_not_inside = position + Vector2X::new(size.x, 0.0);
    let p3_not_inside = position + Vector2X::new(0.0, size.y);
    let p4_not_inside = position + size;
    let p5_inside = position + Vector2X::new(size.x / 2.0, size.y / 2.0);

    assert!(rect.contains(&p1_inside));
    assert!(!rect.contains(&p2_not_inside));
    assert!(!rect.contains(&p3_not_inside));
    assert!(!rect.contains(&p4_not_inside));
    assert!(rect.contains(&p5_inside));
}
