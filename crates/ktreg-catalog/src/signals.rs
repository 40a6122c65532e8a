use serde::{Deserialize, Serialize};

use crate::{TestId, Variant};

/// Default waveform signals for an inclusive TestId range.
///
/// `variant == None` applies to every variant; a variant-specific set with an
/// overlapping range takes precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSetDecl {
    pub name: String,
    pub first: TestId,
    pub last: TestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    pub signals: Vec<String>,
}

const MOTION_SIGNALS: &[&str] = &[
    "clk",
    "RST_n",
    "iPHYS/xx",
    "iPHYS/yy",
    "heading",
    "heading_robot",
    "desired_heading",
    "omega_sum",
    "iPHYS/cntrIR_n",
    "iDUT/iCMD/lftIR",
    "iDUT/iCMD/cntrIR",
    "iDUT/iCMD/rghtIR",
    "error_abs",
    "iDUT/iCMD/square_cnt",
    "iDUT/iCMD/move_done",
    "iDUT/iTC/state",
    "send_resp",
    "resp",
    "/KnightsTour_tb/resp_rdy",
    "mv_indx",
    "move",
    "iDUT/iCMD/pulse_cnt",
    "iDUT/iCMD/state",
];

const TOUR_SIGNALS: &[&str] = &["iDUT/iCMD/tour_go", "fanfare_go", "iDUT/ISPNG/state"];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn default_signal_sets() -> Vec<SignalSetDecl> {
    let mut tour = owned(MOTION_SIGNALS);
    tour.extend(owned(TOUR_SIGNALS));

    vec![
        SignalSetDecl {
            name: "post_synthesis".to_string(),
            first: 0,
            last: 0,
            variant: None,
            signals: owned(&[
                "iDUT/clk",
                "iDUT/RST_n",
                "iDUT/TX",
                "iDUT/RX",
                "iRMT/resp",
                "iRMT/resp_rdy",
            ]),
        },
        SignalSetDecl {
            name: "calibration".to_string(),
            first: 1,
            last: 1,
            variant: None,
            signals: owned(&[
                "iDUT/clk",
                "iDUT/RST_n",
                "iDUT/cal_done",
                "NEMO_setup",
                "send_resp",
                "iRMT/resp",
                "iRMT/resp_rdy",
            ]),
        },
        SignalSetDecl {
            name: "motion".to_string(),
            first: 2,
            last: 14,
            variant: None,
            signals: owned(MOTION_SIGNALS),
        },
        SignalSetDecl {
            name: "tour".to_string(),
            first: 15,
            last: 18,
            variant: None,
            signals: tour,
        },
    ]
}
