//! Python bindings for the rpnroi region proposal library.
//!
//! This module exposes the proposal pipeline and its two building blocks
//! (box decoding and greedy suppression) to Python via PyO3.

use ndarray::ArrayView2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2, PyReadonlyArray4};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use rpnroi::{
    CenterBox, CornerBox, DimOrdering, NmsParams, ProposalConfig as RustProposalConfig,
    RegressionDelta, RpnConfig as RustRpnConfig, RpnRoiError, ScoredBox,
};

/// Convert an RpnRoiError to a Python exception.
fn to_py_err(err: RpnRoiError) -> PyErr {
    match err {
        RpnRoiError::InvalidConfig { .. } => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

fn parse_dim_ordering(value: &str) -> PyResult<DimOrdering> {
    match value.to_ascii_lowercase().as_str() {
        "tf" | "channels_last" => Ok(DimOrdering::ChannelsLast),
        "th" | "channels_first" => Ok(DimOrdering::ChannelsFirst),
        _ => Err(PyValueError::new_err(format!(
            "unknown dim_ordering '{value}', expected 'tf' or 'th'"
        ))),
    }
}

/// Anchor and decoding parameters shared by every call.
#[pyclass]
#[derive(Clone)]
pub struct RpnConfig {
    inner: RustRpnConfig,
}

#[pymethods]
impl RpnConfig {
    /// Create a new RpnConfig.
    ///
    /// Args:
    ///     rpn_stride: Image pixels per feature cell (default: 16)
    ///     std_scaling: Per-component regression scale (default: 4.0 each)
    ///     anchor_box_scales: Anchor sizes (default: [128, 256, 512])
    ///     anchor_box_ratios: Anchor [w, h] multipliers (default: 1:1, 1:2, 2:1)
    ///     num_regions: Regions per anchor set (default: 1)
    ///     num_anchors: Anchors per region, used for class labels (default: 9)
    #[new]
    #[pyo3(signature = (
        rpn_stride = None,
        std_scaling = None,
        anchor_box_scales = None,
        anchor_box_ratios = None,
        num_regions = None,
        num_anchors = None
    ))]
    fn new(
        rpn_stride: Option<f64>,
        std_scaling: Option<[f64; 4]>,
        anchor_box_scales: Option<Vec<f64>>,
        anchor_box_ratios: Option<Vec<[f64; 2]>>,
        num_regions: Option<usize>,
        num_anchors: Option<usize>,
    ) -> PyResult<Self> {
        let defaults = RustRpnConfig::default();
        let inner = RustRpnConfig {
            rpn_stride: rpn_stride.unwrap_or(defaults.rpn_stride),
            std_scaling: std_scaling.unwrap_or(defaults.std_scaling),
            anchor_box_scales: anchor_box_scales.unwrap_or(defaults.anchor_box_scales),
            anchor_box_ratios: anchor_box_ratios.unwrap_or(defaults.anchor_box_ratios),
            num_regions: num_regions.unwrap_or(defaults.num_regions),
            num_anchors: num_anchors.unwrap_or(defaults.num_anchors),
        };
        inner.validate().map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Number of anchor channels the score tensor must carry.
    #[getter]
    fn num_channels(&self) -> usize {
        self.inner.num_channels()
    }

    fn __repr__(&self) -> String {
        format!(
            "RpnConfig(rpn_stride={}, std_scaling={:?}, anchor_box_scales={:?}, anchor_box_ratios={:?}, num_regions={}, num_anchors={})",
            self.inner.rpn_stride,
            self.inner.std_scaling,
            self.inner.anchor_box_scales,
            self.inner.anchor_box_ratios,
            self.inner.num_regions,
            self.inner.num_anchors
        )
    }
}

/// Call-time options for rpn_to_roi.
#[pyclass]
#[derive(Clone)]
pub struct ProposalConfig {
    inner: RustProposalConfig,
}

#[pymethods]
impl ProposalConfig {
    /// Create a new ProposalConfig.
    ///
    /// Args:
    ///     use_regr: Apply the regression map (default: True)
    ///     max_boxes: Maximum number of proposals (default: 5)
    ///     overlap_thresh: Suppression IoU threshold (default: 0.99)
    ///     dim_ordering: "tf" (channels last) or "th" (channels first) (default: "tf")
    ///     parallel: Fill anchor channels in parallel (default: False)
    #[new]
    #[pyo3(signature = (
        use_regr = true,
        max_boxes = 5,
        overlap_thresh = 0.99,
        dim_ordering = "tf",
        parallel = false
    ))]
    fn new(
        use_regr: bool,
        max_boxes: usize,
        overlap_thresh: f64,
        dim_ordering: &str,
        parallel: bool,
    ) -> PyResult<Self> {
        let inner = RustProposalConfig {
            use_regr,
            max_boxes,
            overlap_thresh,
            dim_ordering: parse_dim_ordering(dim_ordering)?,
            parallel,
        };
        inner.validate().map_err(to_py_err)?;
        Ok(Self { inner })
    }

    fn __repr__(&self) -> String {
        let ordering = match self.inner.dim_ordering {
            DimOrdering::ChannelsLast => "tf",
            DimOrdering::ChannelsFirst => "th",
        };
        format!(
            "ProposalConfig(use_regr={}, max_boxes={}, overlap_thresh={}, dim_ordering='{}', parallel={})",
            self.inner.use_regr,
            self.inner.max_boxes,
            self.inner.overlap_thresh,
            ordering,
            self.inner.parallel
        )
    }
}

/// Convert one image's RPN output into proposals.
///
/// Args:
///     rpn: float32 objectness tensor, (1, rows, cols, C) or (1, C, rows, cols)
///     regr: float32 regression tensor with 4 * C channels in the same layout
///     cfg: RpnConfig (default: RpnConfig())
///     params: ProposalConfig (default: ProposalConfig())
///
/// Returns:
///     float64 array of shape (k, 5) with rows x1, y1, x2, y2, class_id
#[pyfunction]
#[pyo3(signature = (rpn, regr, cfg=None, params=None))]
fn rpn_to_roi<'py>(
    py: Python<'py>,
    rpn: PyReadonlyArray4<'py, f32>,
    regr: PyReadonlyArray4<'py, f32>,
    cfg: Option<RpnConfig>,
    params: Option<ProposalConfig>,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let cfg = cfg.map(|c| c.inner).unwrap_or_default();
    let params = params.map(|p| p.inner).unwrap_or_default();
    if rpn.as_array().shape()[0] != 1 || regr.as_array().shape()[0] != 1 {
        return Err(PyValueError::new_err("batch size must be 1"));
    }

    let proposals =
        rpnroi::rpn_to_roi(rpn.as_array(), regr.as_array(), &cfg, &params).map_err(to_py_err)?;
    Ok(proposals.to_table().into_pyarray(py))
}

/// Refine one center-form box with a regression delta.
///
/// Returns the rounded (x, y, w, h); the input box is returned unchanged
/// when the decoded values are not finite.
#[pyfunction]
#[allow(clippy::too_many_arguments)]
fn apply_regr(
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    tx: f64,
    ty: f64,
    tw: f64,
    th: f64,
) -> (f64, f64, f64, f64) {
    let decoded = rpnroi::apply_regr(
        CenterBox::new(x, y, w, h),
        RegressionDelta::new(tx, ty, tw, th),
    )
    .into_box();
    (decoded.x, decoded.y, decoded.w, decoded.h)
}

fn scored_boxes(boxes: ArrayView2<'_, f64>) -> PyResult<Vec<ScoredBox>> {
    if boxes.ncols() != 5 {
        return Err(PyValueError::new_err(format!(
            "boxes must have shape (n, 5), got (n, {})",
            boxes.ncols()
        )));
    }
    let mut out = Vec::with_capacity(boxes.nrows());
    for (idx, row) in boxes.outer_iter().enumerate() {
        let bbox = CornerBox::new(row[0], row[1], row[2], row[3]);
        if !bbox.is_valid() {
            return Err(PyValueError::new_err(format!(
                "degenerate box at row {idx}: x1 >= x2 or y1 >= y2"
            )));
        }
        out.push(ScoredBox::new(bbox, row[4], idx));
    }
    Ok(out)
}

/// Greedy IoU suppression over scored corner boxes.
///
/// Args:
///     boxes: float64 array of shape (n, 5) with rows x1, y1, x2, y2, score
///     num_rectangle: Cells per anchor channel, used for class labels
///     num_anchors: Anchors per region, used for class labels
///     overlap_thresh: Suppression IoU threshold (default: 0.9)
///     max_boxes: Maximum number of picks (default: 300)
///
/// Returns:
///     float64 array of shape (k, 5) with rows x1, y1, x2, y2, class_id
#[pyfunction]
#[pyo3(signature = (boxes, num_rectangle, num_anchors, overlap_thresh=0.9, max_boxes=300))]
fn non_max_suppression<'py>(
    py: Python<'py>,
    boxes: PyReadonlyArray2<'py, f64>,
    num_rectangle: usize,
    num_anchors: usize,
    overlap_thresh: f64,
    max_boxes: usize,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let candidates = scored_boxes(boxes.as_array())?;
    let params = NmsParams {
        num_rectangle,
        overlap_thresh,
        max_boxes,
        num_anchors,
    };
    let rois = rpnroi::non_max_suppression(&candidates, &params).map_err(to_py_err)?;

    let proposals = rpnroi::Proposals {
        rois,
        num_candidates: candidates.len(),
        ..Default::default()
    };
    Ok(proposals.to_table().into_pyarray(py))
}

/// Python module for rpnroi region proposals.
#[pymodule]
fn _rpnroi(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<RpnConfig>()?;
    m.add_class::<ProposalConfig>()?;
    m.add_function(wrap_pyfunction!(rpn_to_roi, m)?)?;
    m.add_function(wrap_pyfunction!(apply_regr, m)?)?;
    m.add_function(wrap_pyfunction!(non_max_suppression, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
