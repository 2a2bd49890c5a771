//! Route-check shape classification.
//!
//! The token contract only accepts transfers whose input/output counts fit
//! one of a fixed set of layouts. Every transfer is first proven through a
//! route-check transaction of the matching shape.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Most token inputs a single transfer may consume.
pub const MAX_TOKEN_INPUTS: usize = 20;

/// Supported `inputs To outputs` layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteCheckShape {
    #[serde(rename = "3To3")]
    ThreeToThree,
    #[serde(rename = "6To6")]
    SixToSix,
    #[serde(rename = "10To10")]
    TenToTen,
    #[serde(rename = "3To100")]
    ThreeToHundred,
    #[serde(rename = "20To3")]
    TwentyToThree,
}

/// Why a transfer could not be assigned a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRejection {
    /// More than [`MAX_TOKEN_INPUTS`] inputs; merge first.
    NeedsMerge,
    /// The output count fits no layout for this input count.
    Unsupported,
}

impl RouteCheckShape {
    pub const ALL: [RouteCheckShape; 5] = [
        RouteCheckShape::ThreeToThree,
        RouteCheckShape::SixToSix,
        RouteCheckShape::TenToTen,
        RouteCheckShape::ThreeToHundred,
        RouteCheckShape::TwentyToThree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteCheckShape::ThreeToThree => "3To3",
            RouteCheckShape::SixToSix => "6To6",
            RouteCheckShape::TenToTen => "10To10",
            RouteCheckShape::ThreeToHundred => "3To100",
            RouteCheckShape::TwentyToThree => "20To3",
        }
    }

    /// `(max inputs, max outputs)` accepted by this layout.
    pub fn capacity(&self) -> (usize, usize) {
        match self {
            RouteCheckShape::ThreeToThree => (3, 3),
            RouteCheckShape::SixToSix => (6, 6),
            RouteCheckShape::TenToTen => (10, 10),
            RouteCheckShape::ThreeToHundred => (3, 100),
            RouteCheckShape::TwentyToThree => (20, 3),
        }
    }

    /// Pick the smallest layout for `inputs` token inputs and `outputs`
    /// token outputs (change included).
    ///
    /// Small input counts prefer the narrow 3To3 layout and fall back to
    /// 3To100 for wide fan-outs before trying the larger square layouts.
    pub fn classify(inputs: usize, outputs: usize) -> Result<RouteCheckShape, ShapeRejection> {
        if inputs > MAX_TOKEN_INPUTS {
            return Err(ShapeRejection::NeedsMerge);
        }
        const ORDER: [RouteCheckShape; 5] = [
            RouteCheckShape::ThreeToThree,
            RouteCheckShape::ThreeToHundred,
            RouteCheckShape::SixToSix,
            RouteCheckShape::TenToTen,
            RouteCheckShape::TwentyToThree,
        ];
        ORDER
            .into_iter()
            .find(|shape| {
                let (max_in, max_out) = shape.capacity();
                inputs <= max_in && outputs <= max_out
            })
            .ok_or(ShapeRejection::Unsupported)
    }
}

impl fmt::Display for RouteCheckShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_table() {
        assert_eq!(RouteCheckShape::classify(2, 2), Ok(RouteCheckShape::ThreeToThree));
        assert_eq!(RouteCheckShape::classify(3, 50), Ok(RouteCheckShape::ThreeToHundred));
        assert_eq!(RouteCheckShape::classify(5, 4), Ok(RouteCheckShape::SixToSix));
        assert_eq!(RouteCheckShape::classify(8, 10), Ok(RouteCheckShape::TenToTen));
        assert_eq!(RouteCheckShape::classify(15, 2), Ok(RouteCheckShape::TwentyToThree));
        assert_eq!(RouteCheckShape::classify(20, 3), Ok(RouteCheckShape::TwentyToThree));
    }

    #[test]
    fn test_too_many_inputs_needs_merge() {
        assert_eq!(RouteCheckShape::classify(25, 1), Err(ShapeRejection::NeedsMerge));
    }

    #[test]
    fn test_unsupported_fan_out() {
        assert_eq!(RouteCheckShape::classify(4, 50), Err(ShapeRejection::Unsupported));
        assert_eq!(RouteCheckShape::classify(15, 5), Err(ShapeRejection::Unsupported));
        assert_eq!(RouteCheckShape::classify(1, 101), Err(ShapeRejection::Unsupported));
    }

    #[test]
    fn test_wire_names() {
        for shape in RouteCheckShape::ALL {
            let json = serde_json::to_string(&shape).unwrap();
            assert_eq!(json, format!("\"{}\"", shape.as_str()));
        }
    }
}
