use rpnroi::{derive_class_id, non_max_suppression, CornerBox, NmsParams, ScoredBox};

fn scored(bbox: CornerBox, score: f64, idx: usize) -> ScoredBox {
    ScoredBox::new(bbox, score, idx)
}

fn params(overlap_thresh: f64, max_boxes: usize) -> NmsParams {
    NmsParams {
        overlap_thresh,
        max_boxes,
        ..NmsParams::new(1000, 3)
    }
}

#[test]
fn overlapping_lower_score_box_is_suppressed() {
    let cands = vec![
        scored(CornerBox::new(0.0, 0.0, 10.0, 10.0), 0.9, 0),
        scored(CornerBox::new(1.0, 1.0, 10.0, 10.0), 0.4, 1),
    ];
    let rois = non_max_suppression(&cands, &params(0.5, 300)).unwrap();
    assert_eq!(rois.len(), 1);
    assert_eq!(rois[0].bbox, cands[0].bbox);
    assert_eq!(rois[0].score, 0.9);
}

#[test]
fn disjoint_boxes_both_survive_in_score_order() {
    let cands = vec![
        scored(CornerBox::new(0.0, 0.0, 4.0, 4.0), 0.4, 0),
        scored(CornerBox::new(10.0, 10.0, 14.0, 14.0), 0.9, 1),
    ];
    let rois = non_max_suppression(&cands, &params(0.5, 300)).unwrap();
    let scores: Vec<f64> = rois.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![0.9, 0.4]);
}

#[test]
fn pick_cap_returns_highest_scores() {
    let scores = [0.3, 0.8, 0.1, 0.95, 0.5];
    let cands: Vec<ScoredBox> = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let x = 10.0 * i as f64;
            scored(CornerBox::new(x, 0.0, x + 5.0, 5.0), s, i)
        })
        .collect();
    let rois = non_max_suppression(&cands, &params(0.5, 2)).unwrap();
    assert_eq!(rois.len(), 2);
    assert_eq!(rois[0].candidate_index, 3);
    assert_eq!(rois[1].candidate_index, 1);
}

#[test]
fn default_params_use_documented_values() {
    let p = NmsParams::new(6, 3);
    assert_eq!(p.overlap_thresh, 0.9);
    assert_eq!(p.max_boxes, 300);
}

#[test]
fn class_derivation_pins_observed_mapping() {
    // class_num = 20 / 6 = 3, and 3 - 1 = 2 < 3
    assert_eq!(derive_class_id(20, 6, 3), 0);
    // class_num = 50 / 6 = 8, and (8 - 1) / 3 = 2
    assert_eq!(derive_class_id(50, 6, 3), 2);
}

#[test]
fn class_ids_come_from_candidate_positions() {
    // 51 disjoint unit boxes; only positions 20 and 50 score high enough to be picked.
    let cands: Vec<ScoredBox> = (0..51)
        .map(|i| {
            let x = 2.0 * i as f64;
            let score = match i {
                50 => 0.9,
                20 => 0.8,
                _ => 0.01,
            };
            scored(CornerBox::new(x, 0.0, x + 1.0, 1.0), score, i)
        })
        .collect();
    let nms = NmsParams {
        max_boxes: 2,
        ..NmsParams::new(6, 3)
    };
    let rois = non_max_suppression(&cands, &nms).unwrap();
    let labelled: Vec<(usize, usize)> = rois.iter().map(|r| (r.candidate_index, r.class_id)).collect();
    assert_eq!(labelled, vec![(50, 2), (20, 0)]);
}

#[test]
fn empty_candidates_return_empty() {
    let rois = non_max_suppression(&[], &NmsParams::new(4, 9)).unwrap();
    assert!(rois.is_empty());
}

#[test]
fn suppression_chain_keeps_only_non_overlapping_picks() {
    // b overlaps a heavily, c overlaps b but not a
    let a = CornerBox::new(0.0, 0.0, 10.0, 10.0);
    let b = CornerBox::new(0.0, 0.0, 10.0, 11.0);
    let c = CornerBox::new(0.0, 10.0, 10.0, 20.0);
    let cands = vec![scored(a, 0.9, 0), scored(b, 0.8, 1), scored(c, 0.7, 2)];
    let rois = non_max_suppression(&cands, &params(0.5, 300)).unwrap();
    let picked: Vec<usize> = rois.iter().map(|r| r.candidate_index).collect();
    assert_eq!(picked, vec![0, 2]);
}
