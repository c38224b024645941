//! Scene content written by the sample commands: zone boxes, the live
//! transform step and the simulated sensor colour.
//!
//! Boxes live at `/World/box_<zone>` and are laid out on a cube grid of
//! side `floor(cbrt(total))`, [`ZONE_SPACING`] units apart.

use serde_json::{Value, json};

use crate::client::LiveDocument;
use crate::client::prim::{MESH_TYPE, PrimPath, XFORM_TYPE, valid_prim_name};
use crate::error::SampleError;

/// Root transform of every sample scene.
pub const WORLD: &str = "/World";

/// Distance between neighbouring zone boxes.
pub const ZONE_SPACING: f64 = 150.0;

/// Half the edge length of a zone box.
pub const BOX_HALF_EXTENT: f64 = 50.0;

/// Constant display colour property.
pub const DISPLAY_COLOR: &str = "primvars:displayColor";

/// Local translation property.
pub const TRANSLATE: &str = "xformOp:translate";

/// Local XYZ rotation property, in degrees.
pub const ROTATE_XYZ: &str = "xformOp:rotateXYZ";

/// Colour of a box at full sensor reading.
pub const BASE_COLOR: [f64; 3] = [0.463, 0.725, 0.0];

/// Largest number of zone boxes one document may hold.
pub const MAX_BOXES: u32 = 1000;

/// Degrees added per transform step.
pub const SPIN_STEP: f64 = 15.0;

/// Distance moved per transform step.
pub const SPIN_RADIUS: f64 = 10.0;

// Corner signs of the 24 box vertices, four per face.
const BOX_CORNERS: [[f64; 3]; 24] = [
    [1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, -1.0],
];

// Two triangles per face.
const BOX_FACE_COUNTS: [u32; 12] = [3; 12];

const BOX_INDICES: [u32; 36] = [
    0, 1, 2, 1, 3, 2, 4, 5, 6, 4, 6, 7, 8, 9, 10, 8, 10, 11, 12, 13, 14, 12, 14, 15, 16, 17, 18,
    16, 18, 19, 20, 21, 22, 20, 22, 23,
];

/// Path of the box for `zone`.
///
/// # Errors
///
/// Propagates prim path validation errors.
pub fn zone_path(zone: u32) -> Result<PrimPath, SampleError> {
    PrimPath::parse(WORLD)?.child(&valid_prim_name(&format!("box_{zone}")))
}

/// Grid offset of `zone` among `total` zones.
#[must_use]
pub fn zone_offset(zone: u32, total: u32) -> [f64; 3] {
    let side = cube_side(total);
    let layer = side * side;
    let x = zone % side;
    let y = (zone % layer) / side;
    let z = zone / layer;
    [
        f64::from(x) * ZONE_SPACING,
        f64::from(y) * ZONE_SPACING,
        f64::from(z) * ZONE_SPACING,
    ]
}

/// `floor(cbrt(total))`, at least 1.
fn cube_side(total: u32) -> u32 {
    let mut side = 1_u32;
    while (side + 1).checked_pow(3).is_some_and(|cube| cube <= total) {
        side += 1;
    }
    side
}

/// Box vertices translated by `offset`.
fn box_points([ox, oy, oz]: [f64; 3]) -> Vec<[f64; 3]> {
    BOX_CORNERS
        .iter()
        .map(|[x, y, z]| {
            [
                x * BOX_HALF_EXTENT + ox,
                y * BOX_HALF_EXTENT + oy,
                z * BOX_HALF_EXTENT + oz,
            ]
        })
        .collect()
}

/// Defines `/World` and `boxes` zone meshes. Edits are queued, not
/// flushed.
///
/// # Errors
///
/// [`SampleError::InvalidArgument`] above [`MAX_BOXES`]; otherwise
/// propagates document errors.
pub fn populate(doc: &mut dyn LiveDocument, boxes: u32) -> Result<Vec<PrimPath>, SampleError> {
    if boxes > MAX_BOXES {
        return Err(SampleError::InvalidArgument(format!(
            "at most {MAX_BOXES} boxes, got {boxes}"
        )));
    }
    let world = PrimPath::parse(WORLD)?;
    doc.define(&world, XFORM_TYPE)?;

    let mut paths = Vec::new();
    for zone in 0..boxes {
        let path = zone_path(zone)?;
        doc.define(&path, MESH_TYPE)?;
        doc.mutate(&path, "points", json!(box_points(zone_offset(zone, boxes))))?;
        doc.mutate(&path, "faceVertexCounts", json!(BOX_FACE_COUNTS))?;
        doc.mutate(&path, "faceVertexIndices", json!(BOX_INDICES.as_slice()))?;
        doc.mutate(&path, DISPLAY_COLOR, json!([BASE_COLOR]))?;
        doc.mutate(&path, TRANSLATE, json!([0.0, 0.0, 0.0]))?;
        doc.mutate(&path, ROTATE_XYZ, json!([0.0, 0.0, 0.0]))?;
        paths.push(path);
    }
    tracing::debug!(uri = %doc.uri(), boxes, "scene populated");
    Ok(paths)
}

/// Reads a three-component property, defaulting to zeros.
#[must_use]
pub fn read_vec3(doc: &dyn LiveDocument, path: &PrimPath, property: &str) -> [f64; 3] {
    let mut out = [0.0; 3];
    if let Some(Value::Array(items)) = doc.get(path, property) {
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item.as_f64().unwrap_or_default();
        }
    }
    out
}

/// Angle accumulator of the live transform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Spin {
    angle: f64,
}

impl Spin {
    /// Current angle in degrees.
    #[must_use]
    pub const fn angle(&self) -> f64 {
        self.angle
    }

    /// Advances by [`SPIN_STEP`], wrapping to 0 at 360, and returns the new
    /// angle.
    pub fn advance(&mut self) -> f64 {
        self.angle += SPIN_STEP;
        if self.angle >= 360.0 {
            self.angle = 0.0;
        }
        self.angle
    }
}

/// Next translation and rotation for `angle` degrees.
#[must_use]
pub fn transform_step(angle: f64, translate: [f64; 3], rotate: [f64; 3]) -> ([f64; 3], [f64; 3]) {
    let radians = angle.to_radians();
    let [tx, ty, tz] = translate;
    let [rx, _, rz] = rotate;
    (
        [
            tx + radians.sin() * SPIN_RADIUS,
            ty,
            tz + radians.cos() * SPIN_RADIUS,
        ],
        [rx, angle, rz],
    )
}

/// Applies one transform step to `path` at `angle` degrees. Edits are
/// queued, not flushed.
///
/// # Errors
///
/// [`SampleError::PrimNotFound`] if the prim does not exist.
pub fn apply_transform(
    doc: &mut dyn LiveDocument,
    path: &PrimPath,
    angle: f64,
) -> Result<([f64; 3], [f64; 3]), SampleError> {
    let (translate, rotate) = transform_step(
        angle,
        read_vec3(doc, path, TRANSLATE),
        read_vec3(doc, path, ROTATE_XYZ),
    );
    doc.mutate(path, TRANSLATE, json!(translate))?;
    doc.mutate(path, ROTATE_XYZ, json!(rotate))?;
    Ok((translate, rotate))
}

/// Simulated sensor: the reading follows `cos(step)` with the step
/// wrapping at 360.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    step: u32,
    variance: f64,
}

impl Default for SensorReading {
    fn default() -> Self {
        Self {
            step: 0,
            variance: 1.0,
        }
    }
}

impl SensorReading {
    /// Current reading.
    #[must_use]
    pub const fn variance(&self) -> f64 {
        self.variance
    }

    /// Display colour for the current reading.
    #[must_use]
    pub fn color(&self) -> Value {
        let [r, g, b] = BASE_COLOR;
        json!([[r * self.variance, g * self.variance, b * self.variance]])
    }

    /// Moves to the next step.
    pub fn advance(&mut self) {
        self.step += 1;
        if self.step >= 360 {
            self.step = 0;
        }
        self.variance = f64::from(self.step).cos();
    }
}
