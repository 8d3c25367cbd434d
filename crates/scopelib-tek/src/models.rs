//! Tektronix model definitions.
//!
//! Both families share most of the SCPI vocabulary; the table below is
//! built once by [`tek_commands`] and the per-family differences are
//! passed in.

use scopelib_core::model::{
    CommandId, CommandSpec, CommandTable, HorizontalScale, PreambleFormat, SaveGroup, ScopeModel,
};

/// Default port of the Tektronix raw socket server.
pub const TEK_SOCKET_PORT: u16 = 4000;

const TIME_DIV_VALUES: &[u32] = &[1, 2, 4, 10, 20, 40, 100, 200, 400];
const TIME_DIV_UNITS: &[&str] = &["ns", "us", "ms", "s"];

const IMPEDANCE: &[&str] = &["FIFTY", "MEG"];
const TRIGGER_MODES: &[&str] = &["NORMAL", "AUTO"];
const TRIGGER_SOURCES: &[&str] = &["CH1", "CH2", "CH3", "CH4", "LINE", "VERTICAL", "EXT10", "EXT"];
const TRIGGER_SLOPES: &[&str] = &["FALL", "RISE"];
const TRIGGER_STATES: &[&str] = &["AUTO", "ARMED", "READY", "SAVE", "TRIGGER"];
const DATA_FORMATS: &[&str] = &["ASCII", "RIBINARY", "RPBINARY", "SRIBINARY", "SRPBINARY"];
const MEASUREMENTS: &[&str] = &[
    "AMPLITUDE", "FREQUENCY", "DELAY", "MAXIMUM", "MINIMUM", "MEAN", "PERIOD", "PHASE", "PK2PK",
    "PWIDTH", "RISE", "FALL", "RMS",
];

/// Index of `TRIGGER` in [`TRIGGER_STATES`].
const TRIGGERED: usize = 4;

/// Commands that differ between families.
struct Family {
    coupling: &'static [&'static str],
    volts_per_div: &'static [&'static str],
    delay_state: &'static str,
    time_per_div: &'static str,
    trigger_position: &'static str,
    init: &'static str,
}

fn tek_commands(f: &Family) -> CommandTable {
    use CommandId::*;
    CommandTable::new(vec![
        CommandSpec::new(ChOn, "SEL:CH%d"),
        CommandSpec::new(ChPos, "CH%d:POS"),
        CommandSpec::with_keywords(ChImp, "CH%d:IMP", IMPEDANCE),
        CommandSpec::with_keywords(ChCpl, "CH%d:COUP", f.coupling),
        CommandSpec::new(ChScl, "CH%d:SCA"),
        CommandSpec::with_keywords(ChSclStep, "CH%d:SCA", f.volts_per_div),
        CommandSpec::new(WfData, "DAT:SOU CH%d; :WAVF?"),
        CommandSpec::new(WfNpts, "HOR:RECORDL"),
        CommandSpec::new(WfWidth, "DAT:WID"),
        CommandSpec::new(WfStart, "DAT:STAR"),
        CommandSpec::new(WfStop, "DAT:STOP"),
        CommandSpec::with_keywords(WfFmt, "DAT:ENC", DATA_FORMATS),
        CommandSpec::new(WfSource, "DATA:SOU"),
        CommandSpec::new(TimDly, "HOR:DEL:TIM"),
        CommandSpec::new(TimDlyState, f.delay_state),
        CommandSpec::new(TimDiv, f.time_per_div),
        CommandSpec::new(TrPos, f.trigger_position),
        CommandSpec::new(TrLev, "TRIG:A:LEV"),
        CommandSpec::new(TrHoldOff, "TRIG:A:HOL"),
        CommandSpec::with_keywords(TrMode, "TRIG:A:MOD", TRIGGER_MODES),
        CommandSpec::with_keywords(TrSource, "TRIG:A:EDGE:SOU", TRIGGER_SOURCES),
        CommandSpec::with_keywords(TrSlope, "TRIG:A:EDGE:SLO", TRIGGER_SLOPES),
        CommandSpec::with_keywords(TrState, "TRIG:STATE?", TRIGGER_STATES),
        CommandSpec::new(AcqState, "ACQ:STATE"),
        CommandSpec::new(Run, "ACQ:STATE RUN"),
        CommandSpec::new(Stop, "ACQ:STATE STOP"),
        CommandSpec::new(Ese, "*ESE"),
        CommandSpec::new(Cls, "*CLS"),
        CommandSpec::new(Esr, "*ESR?"),
        CommandSpec::new(EventQueue, "EVQ?"),
        CommandSpec::new(Opc, "*OPC"),
        CommandSpec::new(Stb, "*STB?"),
        CommandSpec::new(Reset, "*RST"),
        CommandSpec::new(Recall, "*RCL %d"),
        CommandSpec::new(Store, "*SAV %d"),
        CommandSpec::new(Idn, "*IDN?"),
        CommandSpec::new(IpAddr, "ETHER:IPADD?"),
        CommandSpec::new(Init, f.init),
        CommandSpec::new(Header, "HEAD?"),
        CommandSpec::new(GetConf, "*LRN?"),
        CommandSpec::new(ErrMsg, "EVM?"),
        CommandSpec::new(MeasValue, "MEASU:MEAS%d:VAL?"),
        CommandSpec::new(MeasUnits, "MEASU:MEAS%d:UNI?"),
        CommandSpec::with_keywords(MeasType, "MEASU:MEAS%d:TYP", MEASUREMENTS),
        CommandSpec::new(MeasState, "MEASU:MEAS%d:STATE"),
    ])
}

/// Channel, trigger, timebase and acquisition sections.
fn tek_save_groups() -> Vec<SaveGroup> {
    use CommandId::*;
    const CHANNELS: [&str; 4] = ["channel 1", "channel 2", "channel 3", "channel 4"];
    let mut groups: Vec<SaveGroup> = CHANNELS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let ch = i + 1;
            SaveGroup {
                name,
                settings: vec![
                    (ChOn, ch),
                    (ChImp, ch),
                    (ChCpl, ch),
                    (ChScl, ch),
                    (ChPos, ch),
                ],
            }
        })
        .collect();
    groups.push(SaveGroup {
        name: "trigger",
        settings: vec![
            (TrSource, 0),
            (TrSlope, 0),
            (TrMode, 0),
            (TrLev, 0),
            (TrHoldOff, 0),
        ],
    });
    groups.push(SaveGroup {
        name: "timebase",
        settings: vec![(TimDiv, 0), (TrPos, 0), (TimDlyState, 0), (TimDly, 0)],
    });
    groups.push(SaveGroup {
        name: "acquisition",
        settings: vec![
            (WfFmt, 0),
            (WfWidth, 0),
            (WfNpts, 0),
            (WfStart, 0),
            (WfStop, 0),
        ],
    });
    groups
}

/// Tektronix MDO3000 mixed-domain oscilloscopes.
pub fn mdo3000() -> ScopeModel {
    let family = Family {
        coupling: &["DC", "AC", "DCREJ"],
        volts_per_div: &[
            "1.0000E-3", "2.0000E-3", "5.0000E-3", "10.000E-3", "20.000E-3", "50.0000E-3",
            "100.0000E-3", "200.0000E-3", "500.0000E-3", "1.0000", "2.0000", "5.0000", "10.0000",
        ],
        delay_state: "HOR:DEL:MOD",
        time_per_div: "HOR:SCA",
        trigger_position: "HOR:POS",
        init: "*CLS; :DAT:ENC RIB; :HOR:RECORDL 1000; :HEAD OFF; :VERB ON; DAT:WID 1; \
               :DAT:STAR 1; :DAT:STOP 1000; HOR:DEL:MOD 1",
    };
    ScopeModel {
        name: "MDO3000",
        model_id: "mdo3000",
        default_tcp_port: TEK_SOCKET_PORT,
        default_baud_rate: 9600,
        commands: tek_commands(&family),
        time_div_values: TIME_DIV_VALUES,
        time_div_units: TIME_DIV_UNITS,
        horizontal_scales: vec![
            HorizontalScale::new(1, 292, 26),
            HorizontalScale::new(2, 285, 51),
            HorizontalScale::new(4, 270, 101),
            HorizontalScale::new(10, 225, 251),
            HorizontalScale::new(20, 150, 501),
            HorizontalScale::new(40, 0, 1000),
        ],
        preamble: PreambleFormat::MdoSemicolon22,
        trace_length: 1000,
        num_measurements: 4,
        triggered_state: TRIGGERED,
        save_groups: tek_save_groups(),
    }
}

/// Tektronix TDS3000 digital phosphor oscilloscopes.
pub fn tds3000() -> ScopeModel {
    let family = Family {
        coupling: &["DC", "AC", "GND"],
        volts_per_div: &[
            "1.0E-3", "2.0E-3", "5.0E-3", "1.0E-2", "2.0E-2", "5.0E-2", "1.0E-1", "2.0E-1",
            "5.0E-1", "1.0E0", "2.0E0", "5.0E0", "1.0E1",
        ],
        delay_state: "HOR:DEL:STATE",
        time_per_div: "HOR:MAI:SCA",
        trigger_position: "HOR:TRIG:POS",
        init: "*CLS; :DAT:ENC RIB; :HOR:RECORDL 500; :HEAD OFF; :VERB ON; DAT:WID 1; \
               :DAT:STAR 1; :DAT:STOP 500; HOR:DEL:STATE 1",
    };
    ScopeModel {
        name: "TDS3000",
        model_id: "tds3000",
        default_tcp_port: TEK_SOCKET_PORT,
        default_baud_rate: 9600,
        commands: tek_commands(&family),
        time_div_values: TIME_DIV_VALUES,
        time_div_units: TIME_DIV_UNITS,
        horizontal_scales: vec![
            HorizontalScale::new(1, 225, 51),
            HorizontalScale::new(2, 200, 101),
            HorizontalScale::new(4, 150, 201),
            HorizontalScale::new(10, 0, 500),
        ],
        preamble: PreambleFormat::TdsSemicolon16,
        trace_length: 500,
        num_measurements: 4,
        triggered_state: TRIGGERED,
        save_groups: tek_save_groups(),
    }
}

/// Every supported Tektronix model.
pub fn all_tek_models() -> Vec<ScopeModel> {
    vec![mdo3000(), tds3000()]
}

/// Look a model up by name or identifier, ignoring case.
pub fn model_by_name(name: &str) -> Option<ScopeModel> {
    all_tek_models()
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(name) || m.model_id.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use scopelib_core::{EnumMatch, Param};
    use scopelib_engine::ScopeBuilder;
    use scopelib_engine::protocol::{format_command, match_keyword};
    use scopelib_test_harness::MockTransport;

    // ---------------------------------------------------------------
    // Table contents
    // ---------------------------------------------------------------

    #[test]
    fn lookup_by_name_or_id() {
        assert_eq!(model_by_name("MDO3000").unwrap().name, "MDO3000");
        assert_eq!(model_by_name("tds3000").unwrap().trace_length, 500);
        assert!(model_by_name("DS1000Z").is_none());
    }

    #[test]
    fn all_models_have_unique_names() {
        let models = all_tek_models();
        let mut names: Vec<&str> = models.iter().map(|m| m.name).collect();
        let count_before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count_before, "duplicate model names found");
    }

    #[test]
    fn every_command_is_defined() {
        for model in all_tek_models() {
            for spec in model.commands.iter() {
                assert!(
                    !spec.template.is_empty(),
                    "{} has an empty {:?}",
                    model.name,
                    spec.id
                );
            }
            assert!(model.commands.get(CommandId::WfData).unwrap().has_channel());
            assert!(!model.commands.get(CommandId::Idn).unwrap().has_channel());
        }
    }

    #[test]
    fn every_template_formats_cleanly_for_each_channel() {
        for model in all_tek_models() {
            for spec in model.commands.iter() {
                for ch in 1..=4 {
                    let cmd = format_command(spec, ch).unwrap();
                    assert!(!cmd.contains('%'), "{} {:?}: {cmd}", model.name, spec.id);
                    if spec.has_channel() {
                        let digit = ch.to_string();
                        assert_eq!(
                            cmd.matches(digit.as_str()).count(),
                            spec.template.matches(digit.as_str()).count() + 1,
                            "{} {:?}: {cmd}",
                            model.name,
                            spec.id
                        );
                    } else {
                        assert_eq!(cmd, spec.template);
                    }
                }
            }
        }
    }

    #[test]
    fn trigger_state_index_means_triggered() {
        for model in all_tek_models() {
            let states = model.commands.keywords(CommandId::TrState);
            assert_eq!(states[model.triggered_state], "TRIGGER");
        }
    }

    #[test]
    fn scale_tables_end_at_full_record() {
        for model in all_tek_models() {
            let last = model.horizontal_scales.last().unwrap();
            assert_eq!(last.start, 0);
            assert_eq!(last.points, model.trace_length);
            for hs in &model.horizontal_scales {
                assert!(hs.start + hs.points <= model.trace_length, "{}", model.name);
            }
        }
    }

    #[test]
    fn families_differ_where_expected() {
        let mdo = mdo3000();
        let tds = tds3000();
        assert_eq!(mdo.commands.keywords(CommandId::ChCpl)[2], "DCREJ");
        assert_eq!(tds.commands.keywords(CommandId::ChCpl)[2], "GND");
        assert_eq!(mdo.preamble.field_count(), 22);
        assert_eq!(tds.preamble.field_count(), 16);
        assert_eq!(tds.commands.get(CommandId::TimDiv).unwrap().template, "HOR:MAI:SCA");
        assert_eq!(mdo.scale_for(10e-9).points, 251);
        assert_eq!(tds.scale_for(10e-9).points, 500);
    }

    #[test]
    fn volts_per_div_replies_match_exactly() {
        let tds = tds3000();
        let steps = tds.commands.keywords(CommandId::ChSclStep);
        assert_eq!(match_keyword("1.0E-1", steps, EnumMatch::Exact), Some(6));
        assert_eq!(match_keyword("1.0E-1\n", steps, EnumMatch::Exact), Some(6));
        assert_eq!(match_keyword("3.0E-1", steps, EnumMatch::Exact), None);
    }

    #[test]
    fn save_groups_cover_four_channels() {
        let groups = mdo3000().save_groups;
        assert_eq!(groups.len(), 7);
        assert_eq!(groups[3].settings[0], (CommandId::ChOn, 4));
        assert_eq!(groups[4].name, "trigger");
    }

    // ---------------------------------------------------------------
    // End to end
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn tds_init_string_goes_out_first() {
        let mut mock = MockTransport::new();
        mock.expect(
            b"*CLS; :DAT:ENC RIB; :HOR:RECORDL 500; :HEAD OFF; :VERB ON; DAT:WID 1; \
              :DAT:STAR 1; :DAT:STOP 500; HOR:DEL:STATE 1\n",
            b"",
        );
        let handle = mock.handle();
        let scope = ScopeBuilder::new(tds3000())
            .poll_interval(Duration::from_millis(5))
            .command_timeout(Duration::from_millis(20))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        let registry = Arc::clone(scope.registry());

        scope.after_init().unwrap();
        scope.shutdown().await.unwrap();
        assert!(handle.sent_lines()[0].starts_with("*CLS; :DAT:ENC RIB"));
        assert_eq!(registry.get_string(Param::Name, 0), "TDS3000");
    }
}
