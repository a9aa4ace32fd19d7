use clap::Parser;
use ndarray::Array4;
use rpnroi::{rpn_to_roi, DimOrdering, ProposalConfig, Proposals, Roi, RpnConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "rpnroi CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for the proposal stages.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DimOrderingConfig {
    ChannelsLast,
    ChannelsFirst,
}

impl From<DimOrderingConfig> for DimOrdering {
    fn from(value: DimOrderingConfig) -> Self {
        match value {
            DimOrderingConfig::ChannelsLast => DimOrdering::ChannelsLast,
            DimOrderingConfig::ChannelsFirst => DimOrdering::ChannelsFirst,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RpnConfigJson {
    rpn_stride: f64,
    std_scaling: [f64; 4],
    anchor_box_scales: Vec<f64>,
    anchor_box_ratios: Vec<[f64; 2]>,
    num_regions: usize,
    num_anchors: usize,
}

impl Default for RpnConfigJson {
    fn default() -> Self {
        let cfg = RpnConfig::default();
        Self {
            rpn_stride: cfg.rpn_stride,
            std_scaling: cfg.std_scaling,
            anchor_box_scales: cfg.anchor_box_scales,
            anchor_box_ratios: cfg.anchor_box_ratios,
            num_regions: cfg.num_regions,
            num_anchors: cfg.num_anchors,
        }
    }
}

impl From<RpnConfigJson> for RpnConfig {
    fn from(value: RpnConfigJson) -> Self {
        Self {
            rpn_stride: value.rpn_stride,
            std_scaling: value.std_scaling,
            anchor_box_scales: value.anchor_box_scales,
            anchor_box_ratios: value.anchor_box_ratios,
            num_regions: value.num_regions,
            num_anchors: value.num_anchors,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ProposalConfigJson {
    use_regr: bool,
    max_boxes: usize,
    overlap_thresh: f64,
    dim_ordering: DimOrderingConfig,
    parallel: bool,
}

impl Default for ProposalConfigJson {
    fn default() -> Self {
        let cfg = ProposalConfig::default();
        Self {
            use_regr: cfg.use_regr,
            max_boxes: cfg.max_boxes,
            overlap_thresh: cfg.overlap_thresh,
            dim_ordering: DimOrderingConfig::ChannelsLast,
            parallel: cfg.parallel,
        }
    }
}

impl From<ProposalConfigJson> for ProposalConfig {
    fn from(value: ProposalConfigJson) -> Self {
        Self {
            use_regr: value.use_regr,
            max_boxes: value.max_boxes,
            overlap_thresh: value.overlap_thresh,
            dim_ordering: value.dim_ordering.into(),
            parallel: value.parallel,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    input_path: String,
    output_path: Option<String>,
    rpn: RpnConfigJson,
    proposal: ProposalConfigJson,
}

#[derive(Debug, Deserialize)]
struct TensorJson {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl TensorJson {
    fn into_array(self, name: &str) -> Result<Array4<f32>, Box<dyn std::error::Error>> {
        Array4::from_shape_vec(self.shape, self.data)
            .map_err(|err| format!("tensor `{name}` does not match its shape: {err}").into())
    }
}

#[derive(Debug, Deserialize)]
struct Inputs {
    rpn: TensorJson,
    regr: TensorJson,
}

#[derive(Debug, Serialize)]
struct RoiRecord {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    class_id: usize,
    score: f64,
}

impl From<Roi> for RoiRecord {
    fn from(value: Roi) -> Self {
        Self {
            x1: value.bbox.x1,
            y1: value.bbox.y1,
            x2: value.bbox.x2,
            y2: value.bbox.y2,
            class_id: value.class_id,
            score: value.score,
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    num_candidates: usize,
    decode_refined: usize,
    decode_fallback: usize,
    rois: Vec<RoiRecord>,
}

impl From<Proposals> for Output {
    fn from(value: Proposals) -> Self {
        Self {
            num_candidates: value.num_candidates,
            decode_refined: value.decode.refined,
            decode_fallback: value.decode.fallback,
            rois: value.rois.into_iter().map(RoiRecord::from).collect(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("rpnroi=debug".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.input_path.is_empty() {
        return Err("input_path must be set in the config".into());
    }

    let inputs: Inputs = serde_json::from_str(&fs::read_to_string(&config.input_path)?)?;
    let rpn = inputs.rpn.into_array("rpn")?;
    let regr = inputs.regr.into_array("regr")?;

    let rpn_cfg = RpnConfig::from(config.rpn);
    let proposal_cfg = ProposalConfig::from(config.proposal);
    let proposals = rpn_to_roi(rpn.view(), regr.view(), &rpn_cfg, &proposal_cfg)?;
    tracing::info!(rois = proposals.len(), "proposals ready");

    let output = Output::from(proposals);
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
