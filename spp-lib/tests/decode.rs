use std::io::Write;

use spp::decode::{decode_records, PacketDecoder};
use spp::event::{NullSink, Warning, WarningKind};
use spp::record::{PacketRecord, Value};
use spp::spacepacket::{
    read_packets, reassemble, Packet, PrimaryHeader, ReassemblyConfig, SequenceFlags,
};
use spp::xtce::PacketDefinition;
use spp::Error;

/// A contrived JPSS-flavored definition: an abstract CCSDS header root with
/// concrete packet layouts selected by APID, one of which has a second
/// level of inheritance keyed on a MODE field.
const JPSS_XTCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xtce:SpaceSystem xmlns:xtce="http://www.omg.org/space/xtce" name="JPSS_CONTRIVED">
    <xtce:TelemetryMetaData>
        <xtce:ParameterTypeSet>
            <xtce:IntegerParameterType name="U3_Type">
                <xtce:IntegerDataEncoding sizeInBits="3"/>
            </xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U1_Type">
                <xtce:IntegerDataEncoding sizeInBits="1"/>
            </xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U11_Type">
                <xtce:IntegerDataEncoding sizeInBits="11"/>
            </xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U2_Type">
                <xtce:IntegerDataEncoding sizeInBits="2"/>
            </xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U14_Type">
                <xtce:IntegerDataEncoding sizeInBits="14"/>
            </xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U16_Type">
                <xtce:IntegerDataEncoding sizeInBits="16"/>
            </xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U32_Type">
                <xtce:IntegerDataEncoding sizeInBits="32"/>
            </xtce:IntegerParameterType>
            <xtce:IntegerParameterType name="U8_Type">
                <xtce:IntegerDataEncoding sizeInBits="8"/>
            </xtce:IntegerParameterType>
            <xtce:FloatParameterType name="F32_Type">
                <xtce:FloatDataEncoding sizeInBits="32"/>
            </xtce:FloatParameterType>
            <xtce:FloatParameterType name="MIL32_Type">
                <xtce:FloatDataEncoding sizeInBits="32" encoding="MIL-1750A"/>
            </xtce:FloatParameterType>
            <xtce:EnumeratedParameterType name="PWR_Type">
                <xtce:EnumerationList>
                    <xtce:Enumeration value="0" label="OFF"/>
                    <xtce:Enumeration value="1" label="ON"/>
                    <xtce:Enumeration value="2" label="ON"/>
                </xtce:EnumerationList>
                <xtce:IntegerDataEncoding sizeInBits="8"/>
            </xtce:EnumeratedParameterType>
            <xtce:IntegerParameterType name="DEGC_Type">
                <xtce:UnitSet>
                    <xtce:Unit>degC</xtce:Unit>
                </xtce:UnitSet>
                <xtce:IntegerDataEncoding sizeInBits="16">
                    <xtce:DefaultCalibrator>
                        <xtce:PolynomialCalibrator>
                            <xtce:Term exponent="0" coefficient="-100"/>
                            <xtce:Term exponent="1" coefficient="0.5"/>
                        </xtce:PolynomialCalibrator>
                    </xtce:DefaultCalibrator>
                </xtce:IntegerDataEncoding>
            </xtce:IntegerParameterType>
            <xtce:StringParameterType name="TAG_Type">
                <xtce:StringDataEncoding>
                    <xtce:SizeInBits>
                        <xtce:Fixed>
                            <xtce:FixedValue>16</xtce:FixedValue>
                        </xtce:Fixed>
                    </xtce:SizeInBits>
                </xtce:StringDataEncoding>
            </xtce:StringParameterType>
        </xtce:ParameterTypeSet>
        <xtce:ParameterSet>
            <xtce:Parameter name="VERSION" parameterTypeRef="U3_Type" shortDescription="CCSDS version"/>
            <xtce:Parameter name="TYPE" parameterTypeRef="U1_Type"/>
            <xtce:Parameter name="SEC_HDR_FLG" parameterTypeRef="U1_Type"/>
            <xtce:Parameter name="PKT_APID" parameterTypeRef="U11_Type"/>
            <xtce:Parameter name="SEQ_FLGS" parameterTypeRef="U2_Type"/>
            <xtce:Parameter name="SRC_SEQ_CTR" parameterTypeRef="U14_Type"/>
            <xtce:Parameter name="PKT_LEN" parameterTypeRef="U16_Type"/>
            <xtce:Parameter name="ATT_DAY" parameterTypeRef="U16_Type"/>
            <xtce:Parameter name="ATT_MSEC" parameterTypeRef="U32_Type"/>
            <xtce:Parameter name="ATT_Q1" parameterTypeRef="F32_Type"/>
            <xtce:Parameter name="ATT_Q2" parameterTypeRef="F32_Type"/>
            <xtce:Parameter name="PWR_STATE" parameterTypeRef="PWR_Type"/>
            <xtce:Parameter name="HK_TEMP" parameterTypeRef="U32_Type"/>
            <xtce:Parameter name="MIL_VAL" parameterTypeRef="MIL32_Type"/>
            <xtce:Parameter name="MODE" parameterTypeRef="U8_Type"/>
            <xtce:Parameter name="SCI_VAL" parameterTypeRef="U16_Type"/>
            <xtce:Parameter name="ENG_TEMP" parameterTypeRef="DEGC_Type"/>
            <xtce:Parameter name="ENG_NAME" parameterTypeRef="TAG_Type"/>
        </xtce:ParameterSet>
        <xtce:ContainerSet>
            <xtce:SequenceContainer name="CCSDSPacket" abstract="true">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="VERSION"/>
                    <xtce:ParameterRefEntry parameterRef="TYPE"/>
                    <xtce:ParameterRefEntry parameterRef="SEC_HDR_FLG"/>
                    <xtce:ParameterRefEntry parameterRef="PKT_APID"/>
                    <xtce:ParameterRefEntry parameterRef="SEQ_FLGS"/>
                    <xtce:ParameterRefEntry parameterRef="SRC_SEQ_CTR"/>
                    <xtce:ParameterRefEntry parameterRef="PKT_LEN"/>
                </xtce:EntryList>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="JPSS_ATT_EPHEM">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="ATT_DAY"/>
                    <xtce:ParameterRefEntry parameterRef="ATT_MSEC"/>
                    <xtce:ParameterRefEntry parameterRef="ATT_Q1"/>
                    <xtce:ParameterRefEntry parameterRef="ATT_Q2"/>
                    <xtce:ParameterRefEntry parameterRef="PWR_STATE"/>
                </xtce:EntryList>
                <xtce:BaseContainer containerRef="CCSDSPacket">
                    <xtce:RestrictionCriteria>
                        <xtce:ComparisonList>
                            <xtce:Comparison parameterRef="VERSION" value="0"/>
                            <xtce:Comparison parameterRef="PKT_APID" value="11"/>
                        </xtce:ComparisonList>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="JPSS_HK">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="HK_TEMP"/>
                </xtce:EntryList>
                <xtce:BaseContainer containerRef="CCSDSPacket">
                    <xtce:RestrictionCriteria>
                        <xtce:Comparison parameterRef="PKT_APID" value="12"/>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="JPSS_MIL">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="MIL_VAL"/>
                </xtce:EntryList>
                <xtce:BaseContainer containerRef="CCSDSPacket">
                    <xtce:RestrictionCriteria>
                        <xtce:Comparison parameterRef="PKT_APID" value="13"/>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="TLM_BASE" abstract="true">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="MODE"/>
                </xtce:EntryList>
                <xtce:BaseContainer containerRef="CCSDSPacket">
                    <xtce:RestrictionCriteria>
                        <xtce:Comparison parameterRef="PKT_APID" value="14"/>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="TLM_SCI">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="SCI_VAL"/>
                </xtce:EntryList>
                <xtce:BaseContainer containerRef="TLM_BASE">
                    <xtce:RestrictionCriteria>
                        <xtce:Comparison parameterRef="MODE" value="1"/>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
            </xtce:SequenceContainer>
            <xtce:SequenceContainer name="TLM_ENG">
                <xtce:EntryList>
                    <xtce:ParameterRefEntry parameterRef="ENG_TEMP"/>
                    <xtce:ParameterRefEntry parameterRef="ENG_NAME"/>
                </xtce:EntryList>
                <xtce:BaseContainer containerRef="TLM_BASE">
                    <xtce:RestrictionCriteria>
                        <xtce:Comparison parameterRef="MODE" value="2"/>
                    </xtce:RestrictionCriteria>
                </xtce:BaseContainer>
            </xtce:SequenceContainer>
        </xtce:ContainerSet>
    </xtce:TelemetryMetaData>
</xtce:SpaceSystem>
"#;

/// Header-only definition where the root is concrete and the user data is
/// swallowed by a binary field sized from PKT_LEN.
const HEADER_XTCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SpaceSystem xmlns="http://www.omg.org/spec/XTCE/20180204" name="HEADER_ONLY">
    <TelemetryMetaData>
        <ParameterTypeSet>
            <IntegerParameterType name="U3_Type">
                <IntegerDataEncoding sizeInBits="3"/>
            </IntegerParameterType>
            <IntegerParameterType name="U1_Type">
                <IntegerDataEncoding sizeInBits="1"/>
            </IntegerParameterType>
            <IntegerParameterType name="U11_Type">
                <IntegerDataEncoding sizeInBits="11"/>
            </IntegerParameterType>
            <IntegerParameterType name="U2_Type">
                <IntegerDataEncoding sizeInBits="2"/>
            </IntegerParameterType>
            <IntegerParameterType name="U14_Type">
                <IntegerDataEncoding sizeInBits="14"/>
            </IntegerParameterType>
            <IntegerParameterType name="U16_Type">
                <IntegerDataEncoding sizeInBits="16"/>
            </IntegerParameterType>
            <BinaryParameterType name="DATA_Type">
                <BinaryDataEncoding>
                    <SizeInBits>
                        <DynamicValue>
                            <ParameterInstanceRef parameterRef="PKT_LEN" useCalibratedValue="false"/>
                            <LinearAdjustment slope="8" intercept="8"/>
                        </DynamicValue>
                    </SizeInBits>
                </BinaryDataEncoding>
            </BinaryParameterType>
        </ParameterTypeSet>
        <ParameterSet>
            <Parameter name="VERSION" parameterTypeRef="U3_Type"/>
            <Parameter name="TYPE" parameterTypeRef="U1_Type"/>
            <Parameter name="SEC_HDR_FLG" parameterTypeRef="U1_Type"/>
            <Parameter name="PKT_APID" parameterTypeRef="U11_Type"/>
            <Parameter name="SEQ_FLGS" parameterTypeRef="U2_Type"/>
            <Parameter name="SRC_SEQ_CTR" parameterTypeRef="U14_Type"/>
            <Parameter name="PKT_LEN" parameterTypeRef="U16_Type"/>
            <Parameter name="USER_DATA" parameterTypeRef="DATA_Type"/>
        </ParameterSet>
        <ContainerSet>
            <SequenceContainer name="CCSDSPacket">
                <EntryList>
                    <ParameterRefEntry parameterRef="VERSION"/>
                    <ParameterRefEntry parameterRef="TYPE"/>
                    <ParameterRefEntry parameterRef="SEC_HDR_FLG"/>
                    <ParameterRefEntry parameterRef="PKT_APID"/>
                    <ParameterRefEntry parameterRef="SEQ_FLGS"/>
                    <ParameterRefEntry parameterRef="SRC_SEQ_CTR"/>
                    <ParameterRefEntry parameterRef="PKT_LEN"/>
                    <ParameterRefEntry parameterRef="USER_DATA"/>
                </EntryList>
            </SequenceContainer>
        </ContainerSet>
    </TelemetryMetaData>
</SpaceSystem>
"#;

fn packet(apid: u16, user_data: &[u8]) -> Packet {
    Packet::build(
        PrimaryHeader {
            version: 0,
            packet_type: 0,
            has_secondary_header: false,
            apid,
            sequence_flags: SequenceFlags::Unsegmented,
            sequence_count: 42,
            len_minus1: 0,
        },
        user_data,
    )
    .unwrap()
}

fn uint(record: &PacketRecord, name: &str) -> u64 {
    match record.get(name).unwrap().raw_value {
        Value::Unsigned(v) => v,
        ref other => panic!("{name} is not unsigned: {other:?}"),
    }
}

#[test]
fn s1_simple_primary_header() {
    let dat: &[u8] = &[
        0x08, 0x0b, 0x00, 0x00, 0x00, 0x06, 0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03,
    ];
    let definition = PacketDefinition::from_str(HEADER_XTCE).unwrap();
    let packet = Packet::decode(dat).unwrap();

    let mut warnings: Vec<Warning> = Vec::new();
    let record = PacketDecoder::new(&definition)
        .decode(&packet, &mut warnings)
        .unwrap();

    assert_eq!(uint(&record, "VERSION"), 0);
    assert_eq!(uint(&record, "TYPE"), 0);
    assert_eq!(uint(&record, "SEC_HDR_FLG"), 0);
    assert_eq!(uint(&record, "PKT_APID"), 11);
    assert_eq!(uint(&record, "SEQ_FLGS"), 0);
    assert_eq!(uint(&record, "SRC_SEQ_CTR"), 0);
    assert_eq!(uint(&record, "PKT_LEN"), 6);
    assert_eq!(
        record.get("USER_DATA").unwrap().raw_value,
        Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03])
    );
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
}

fn att_ephem_user_data() -> Vec<u8> {
    let mut user = Vec::new();
    user.extend_from_slice(&258u16.to_be_bytes());
    user.extend_from_slice(&1_000_000u32.to_be_bytes());
    user.extend_from_slice(&1.5f32.to_be_bytes());
    user.extend_from_slice(&(-0.5f32).to_be_bytes());
    user.push(0x00); // PWR_STATE = OFF
    user
}

#[test]
fn s2_polymorphic_selection() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let decoder = PacketDecoder::new(&definition);

    let mut warnings: Vec<Warning> = Vec::new();
    let record = decoder
        .decode(&packet(11, &att_ephem_user_data()), &mut warnings)
        .unwrap();
    assert_eq!(uint(&record, "ATT_DAY"), 258);
    assert_eq!(uint(&record, "ATT_MSEC"), 1_000_000);
    assert_eq!(record.get("ATT_Q1").unwrap().raw_value, Value::Float(1.5));
    assert_eq!(record.get("ATT_Q2").unwrap().raw_value, Value::Float(-0.5));
    assert!(warnings.is_empty());

    // APID 15 matches nothing: reported and skipped.
    let mut warnings: Vec<Warning> = Vec::new();
    let err = decoder
        .decode(&packet(15, &[0xff, 0xff]), &mut warnings)
        .unwrap_err();
    assert!(matches!(err, Error::Malformed(_)));
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::UnknownApid);
    assert_eq!(warnings[0].apid, Some(15));
}

#[test]
fn s3_enumerated_duplicate_labels_and_falsy_raw() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let record = PacketDecoder::new(&definition)
        .decode(&packet(11, &att_ephem_user_data()), &mut NullSink)
        .unwrap();

    let field = record.get("PWR_STATE").unwrap();
    assert_eq!(field.raw_value, Value::Unsigned(0));
    assert_eq!(field.derived_value, Value::String("OFF".to_string()));
}

#[test]
fn s4_segmented_reassembly() {
    let segment = |flags, seq, user: &[u8]| {
        Packet::build(
            PrimaryHeader {
                version: 0,
                packet_type: 0,
                has_secondary_header: false,
                apid: 7,
                sequence_flags: flags,
                sequence_count: seq,
                len_minus1: 0,
            },
            user,
        )
        .unwrap()
    };
    let segments = vec![
        segment(SequenceFlags::First, 100, &[0xaa, 0xbb]),
        segment(SequenceFlags::Continuation, 101, &[0xcc]),
        segment(SequenceFlags::Last, 102, &[0xdd, 0xee]),
    ];
    let config = ReassemblyConfig {
        secondary_header_bytes: 1,
        apids: None,
    };
    let logical: Vec<Packet> = reassemble(segments.into_iter(), config, NullSink)
        .map(|z| z.unwrap())
        .collect();

    assert_eq!(logical.len(), 1);
    assert_eq!(logical[0].user_data(), &[0xaa, 0xbb, 0xee]);
    assert_eq!(logical[0].header.sequence_count, 100);
    assert_eq!(logical[0].header.data_len(), 3);
}

#[test]
fn s5_underrun_warning() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    // JPSS_HK wants 4 bytes of user data; send 6. 96 declared bits, 80
    // decoded.
    let mut warnings: Vec<Warning> = Vec::new();
    let record = PacketDecoder::new(&definition)
        .decode(&packet(12, &[0, 0, 0, 9, 0xba, 0xad]), &mut warnings)
        .unwrap();

    assert_eq!(uint(&record, "HK_TEMP"), 9);
    assert_eq!(record.decoded_bits(), 80);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::UnderRun);
    assert_eq!(warnings[0].position, Some(80));
    assert!(warnings[0].message.contains("16"), "{}", warnings[0].message);
}

#[test]
fn s6_mil1750a_decode() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let decoder = PacketDecoder::new(&definition);

    // 0.5 x 2^1 and -1.0 from the MIL-STD-1750A coding examples.
    let record = decoder
        .decode(&packet(13, &0x4000_0001u32.to_be_bytes()), &mut NullSink)
        .unwrap();
    assert_eq!(record.get("MIL_VAL").unwrap().raw_value, Value::Float(1.0));

    let record = decoder
        .decode(&packet(13, &0x8000_0000u32.to_be_bytes()), &mut NullSink)
        .unwrap();
    assert_eq!(record.get("MIL_VAL").unwrap().raw_value, Value::Float(-1.0));

    // Positive extreme, within 1 ULP.
    let record = decoder
        .decode(&packet(13, &0x7FFF_FF7Fu32.to_be_bytes()), &mut NullSink)
        .unwrap();
    let Value::Float(v) = record.get("MIL_VAL").unwrap().raw_value else {
        panic!("MIL_VAL is not a float");
    };
    let expected = 8_388_607.0 * 2f64.powi(104);
    assert!((v - expected).abs() <= expected * f64::EPSILON);
}

#[test]
fn p6_only_matching_inheritor_applies() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let decoder = PacketDecoder::new(&definition);

    let record = decoder
        .decode(&packet(14, &[0x01, 0x12, 0x34]), &mut NullSink)
        .unwrap();
    assert_eq!(uint(&record, "MODE"), 1);
    assert_eq!(uint(&record, "SCI_VAL"), 0x1234);
    assert!(record.get("ENG_TEMP").is_none());

    let record = decoder
        .decode(&packet(14, &[0x02, 0x01, 0x0e, b'o', b'k']), &mut NullSink)
        .unwrap();
    assert_eq!(uint(&record, "MODE"), 2);
    assert!(record.get("SCI_VAL").is_none());
    // 270 raw, calibrated -100 + 0.5 * 270 = 35.
    let field = record.get("ENG_TEMP").unwrap();
    assert_eq!(field.raw_value, Value::Unsigned(270));
    assert_eq!(field.derived_value, Value::Float(35.0));
    assert_eq!(field.unit.as_deref(), Some("degC"));
    assert_eq!(
        record.get("ENG_NAME").unwrap().derived_value,
        Value::String("ok".to_string())
    );
}

#[test]
fn p2_bit_accounting() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let packet = packet(11, &att_ephem_user_data());
    let record = PacketDecoder::new(&definition)
        .decode(&packet, &mut NullSink)
        .unwrap();

    let field_bits: usize = record.fields().iter().map(|f| f.bit_length).sum();
    assert_eq!(field_bits, record.decoded_bits());
    assert_eq!(record.decoded_bits(), packet.data.len() * 8);
}

#[test]
fn p3_idempotent_decoding() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let decoder = PacketDecoder::new(&definition);
    let packet = packet(11, &att_ephem_user_data());

    let first = decoder.decode(&packet, &mut NullSink).unwrap();
    let second = decoder.decode(&packet, &mut NullSink).unwrap();
    assert_eq!(first, second);
}

#[test]
fn p1_definition_roundtrip() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let serialized = definition.to_xml_string().unwrap();
    let reloaded = PacketDefinition::from_str(&serialized).unwrap();
    assert_eq!(reloaded, definition);

    // And again, to make sure serialization is stable.
    assert_eq!(reloaded.to_xml_string().unwrap(), serialized);
}

#[test]
fn p4_source_equivalence() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let mut stream = Vec::new();
    stream.extend_from_slice(&packet(11, &att_ephem_user_data()).data);
    stream.extend_from_slice(&packet(13, &0x4000_0001u32.to_be_bytes()).data);
    stream.extend_from_slice(&packet(14, &[0x01, 0x12, 0x34]).data);

    let from_memory: Vec<PacketRecord> = decode_records(
        read_packets(&stream[..]).map(Result::unwrap),
        &definition,
        NullSink,
    )
    .map(Result::unwrap)
    .collect();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&stream).unwrap();
    let reader = std::fs::File::open(file.path()).unwrap();
    let from_file: Vec<PacketRecord> = decode_records(
        read_packets(reader).map(Result::unwrap),
        &definition,
        NullSink,
    )
    .map(Result::unwrap)
    .collect();

    assert_eq!(from_memory.len(), 3);
    assert_eq!(from_memory, from_file);

    #[cfg(unix)]
    {
        use std::os::unix::net::UnixStream;
        let (mut tx, rx) = UnixStream::pair().unwrap();
        let payload = stream.clone();
        let writer = std::thread::spawn(move || {
            tx.write_all(&payload).unwrap();
        });
        let from_socket: Vec<PacketRecord> = decode_records(
            read_packets(rx).map(Result::unwrap),
            &definition,
            NullSink,
        )
        .map(Result::unwrap)
        .collect();
        writer.join().unwrap();
        assert_eq!(from_memory, from_socket);
    }
}

#[test]
fn pipeline_continues_after_bad_packet() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let mut stream = Vec::new();
    stream.extend_from_slice(&packet(11, &att_ephem_user_data()).data);
    stream.extend_from_slice(&packet(15, &[0xff]).data); // no container
    stream.extend_from_slice(&packet(13, &0x4000_0001u32.to_be_bytes()).data);

    let results: Vec<spp::Result<PacketRecord>> = decode_records(
        read_packets(&stream[..]).map(Result::unwrap),
        &definition,
        NullSink,
    )
    .collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
}

#[test]
fn record_serializes_to_json() {
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let record = PacketDecoder::new(&definition)
        .decode(&packet(11, &att_ephem_user_data()), &mut NullSink)
        .unwrap();
    let json = serde_json::to_value(&record).unwrap();
    let fields = json.get("fields").unwrap().as_array().unwrap();
    assert_eq!(fields.len(), 12);
    assert_eq!(fields[3]["name"], "PKT_APID");
    assert_eq!(fields[3]["raw_value"], 11);
}

#[test]
fn reassembled_stream_decodes() {
    // A two-segment APID 12 housekeeping packet split mid-value.
    let definition = PacketDefinition::from_str(JPSS_XTCE).unwrap();
    let build = |flags, seq, user: &[u8]| {
        Packet::build(
            PrimaryHeader {
                version: 0,
                packet_type: 0,
                has_secondary_header: false,
                apid: 12,
                sequence_flags: flags,
                sequence_count: seq,
                len_minus1: 0,
            },
            user,
        )
        .unwrap()
    };
    let segments = vec![
        build(SequenceFlags::First, 200, &[0x00, 0x00]),
        build(SequenceFlags::Last, 201, &[0x00, 0x2a]),
    ];
    let logical = reassemble(
        segments.into_iter(),
        ReassemblyConfig::default(),
        NullSink,
    );
    let records: Vec<PacketRecord> = decode_records(
        logical.map(Result::unwrap),
        &definition,
        NullSink,
    )
    .map(Result::unwrap)
    .collect();

    assert_eq!(records.len(), 1);
    assert_eq!(uint(&records[0], "HK_TEMP"), 42);
}
