//! Fixtures shared by the engine's unit tests.

use std::sync::Arc;
use std::time::Duration;

use scopelib_core::model::{
    CommandId, CommandSpec, CommandTable, HorizontalScale, PreambleFormat, SaveGroup, ScopeModel,
};
use scopelib_core::registry::Registry;
use scopelib_test_harness::MockTransport;

use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::engine::{Engine, EngineConfig};

/// A four-channel model with MDO-style commands and a small capture.
pub(crate) fn test_model() -> ScopeModel {
    use CommandId::*;
    ScopeModel {
        name: "Fixture",
        model_id: "FIXTURE",
        default_tcp_port: 4000,
        default_baud_rate: 9600,
        commands: CommandTable::new(vec![
            CommandSpec::new(ChOn, "SEL:CH%d"),
            CommandSpec::new(ChPos, "CH%d:POS"),
            CommandSpec::with_keywords(ChImp, "CH%d:IMP", &["FIFTY", "MEG"]),
            CommandSpec::with_keywords(ChCpl, "CH%d:COUP", &["DC", "AC", "DCREJ"]),
            CommandSpec::new(ChScl, "CH%d:SCA"),
            CommandSpec::with_keywords(ChSclStep, "CH%d:SCA", &["1.0E-3", "2.0E-3", "5.0E-3"]),
            CommandSpec::new(WfData, "DAT:SOU CH%d; :WAVF?"),
            CommandSpec::new(WfNpts, "HOR:RECORDL"),
            CommandSpec::new(WfWidth, "DAT:WID"),
            CommandSpec::new(WfStart, "DAT:STAR"),
            CommandSpec::new(WfStop, "DAT:STOP"),
            CommandSpec::with_keywords(WfFmt, "DAT:ENC", &["ASCII", "RIBINARY", "RPBINARY"]),
            CommandSpec::new(WfSource, "DATA:SOU"),
            CommandSpec::new(TimDly, "HOR:DEL:TIM"),
            CommandSpec::new(TimDlyState, "HOR:DEL:MOD"),
            CommandSpec::new(TimDiv, "HOR:SCA"),
            CommandSpec::new(TrPos, "HOR:POS"),
            CommandSpec::new(TrLev, "TRIG:A:LEV"),
            CommandSpec::new(TrHoldOff, "TRIG:A:HOL"),
            CommandSpec::with_keywords(TrMode, "TRIG:A:MOD", &["NORMAL", "AUTO"]),
            CommandSpec::with_keywords(
                TrSource,
                "TRIG:A:EDGE:SOU",
                &["CH1", "CH2", "CH3", "CH4", "LINE"],
            ),
            CommandSpec::with_keywords(TrSlope, "TRIG:A:EDGE:SLO", &["FALL", "RISE"]),
            CommandSpec::with_keywords(
                TrState,
                "TRIG:STATE?",
                &["AUTO", "ARMED", "READY", "SAVE", "TRIGGER"],
            ),
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
            CommandSpec::new(Init, "*CLS; :HEAD OFF"),
            CommandSpec::new(Header, "HEAD?"),
            CommandSpec::new(GetConf, ""),
            CommandSpec::new(ErrMsg, "EVM?"),
            CommandSpec::new(MeasValue, "MEASU:MEAS%d:VAL?"),
            CommandSpec::new(MeasUnits, "MEASU:MEAS%d:UNI?"),
            CommandSpec::with_keywords(MeasType, "MEASU:MEAS%d:TYP", &["AMPLITUDE", "FREQUENCY"]),
            CommandSpec::new(MeasState, "MEASU:MEAS%d:STATE"),
        ]),
        time_div_values: &[1, 2, 4, 10, 20, 40, 100, 200, 400],
        time_div_units: &["ns", "us", "ms", "s"],
        horizontal_scales: vec![
            HorizontalScale::new(1, 2, 4),
            HorizontalScale::new(10, 0, 8),
        ],
        preamble: PreambleFormat::MdoSemicolon22,
        trace_length: 8,
        num_measurements: 2,
        triggered_state: 4,
        save_groups: vec![
            SaveGroup {
                name: "channel 1",
                settings: vec![(ChPos, 1), (ChScl, 1)],
            },
            SaveGroup {
                name: "trigger",
                settings: vec![(TrLev, 0), (TrMode, 0)],
            },
        ],
    }
}

pub(crate) fn dispatcher(mock: MockTransport) -> (Dispatcher, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::new(
        Box::new(mock),
        Arc::new(test_model()),
        Arc::clone(&registry),
        &DispatchConfig {
            command_timeout: Duration::from_millis(50),
            ..DispatchConfig::default()
        },
    );
    (dispatcher, registry)
}

pub(crate) fn engine(mock: MockTransport) -> Engine {
    engine_with(mock, EngineConfig::default())
}

pub(crate) fn engine_with(mock: MockTransport, config: EngineConfig) -> Engine {
    let registry = Arc::new(Registry::new());
    Engine::new(
        Box::new(mock),
        Arc::new(test_model()),
        registry,
        EngineConfig {
            dispatch: DispatchConfig {
                command_timeout: Duration::from_millis(50),
                ..config.dispatch.clone()
            },
            ..config
        },
    )
}

/// An MDO-style 22-field preamble for `n` one-byte samples.
pub(crate) fn mdo_preamble(n: usize, ymult: f64, yoff: f64, yzero: f64) -> String {
    format!(
        "1;8;BIN;RI;MSB;\"Ch1, DC coupling\";{n};Y;LINEAR;\"s\";4.0E-9;0.0;0;\"V\";\
         {ymult};{yoff};{yzero};TIME;ANALOG;0.0;0.0;0.0;"
    )
}

/// A complete waveform reply: preamble, block header, payload, newline.
pub(crate) fn waveform_reply(preamble: &str, samples: &[u8]) -> Vec<u8> {
    let len = samples.len().to_string();
    let mut reply = preamble.as_bytes().to_vec();
    reply.extend_from_slice(format!("#{}{}", len.len(), len).as_bytes());
    reply.extend_from_slice(samples);
    reply.push(b'\n');
    reply
}
