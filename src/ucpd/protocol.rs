use bitfield::bitfield;

/// Byte length of the message header.
pub const HEADER_BYTES: usize = 2;

/// Control message type of the GoodCRC acknowledgement.
pub const MSG_TYPE_GOODCRC: u16 = 0x01;

/// Specification revision field value for PD 2.0.
pub const SPEC_REV_2_0: u16 = 0b01;
/// Specification revision field value for PD 3.0.
pub const SPEC_REV_3_0: u16 = 0b10;

bitfield! {
    /// USB-PD message header, first two bytes of every message.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Header(u16);
    impl Debug;
    u16;
    pub msg_type, set_msg_type : 4, 0;
    /// Port Data Role
    pub data_role, set_data_role : 5;
    pub spec_rev, set_spec_rev : 7, 6;
    /// Port Power Role
    pub power_role, set_power_role : 8;
    pub msg_id, set_msg_id : 11, 9;
    pub num_data_objs, set_num_data_objs : 14, 12;
    pub ext, set_ext : 15;
}

impl Header {
    /// Hardware GoodCRC reply template. The transceiver fills in the
    /// message ID echoed from the received message; everything else is
    /// taken from this template.
    pub fn good_crc_template(spec_rev: u16, power_role: bool, data_role: bool) -> Header {
        let mut header = Header(0);
        header.set_msg_type(MSG_TYPE_GOODCRC);
        header.set_spec_rev(spec_rev);
        header.set_power_role(power_role);
        header.set_data_role(data_role);
        header
    }

    /// GoodCRC reply to a specific received header, for replies built in
    /// software rather than by the hardware engine.
    pub fn good_crc_reply(received: Header, power_role: bool, data_role: bool) -> Header {
        let mut header = Header::good_crc_template(received.spec_rev(), power_role, data_role);
        header.set_msg_id(received.msg_id());
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_template_matches_the_classic_reply_header() {
        let header = Header::good_crc_template(SPEC_REV_2_0, false, false);
        assert_eq!(header.0, 0x0041);
    }

    #[test]
    fn reply_echoes_message_id_and_revision() {
        let mut received = Header(0);
        received.set_msg_type(0x0c);
        received.set_spec_rev(SPEC_REV_3_0);
        received.set_msg_id(5);
        received.set_num_data_objs(3);

        let reply = Header::good_crc_reply(received, true, true);
        assert_eq!(reply.msg_type(), MSG_TYPE_GOODCRC);
        assert_eq!(reply.msg_id(), 5);
        assert_eq!(reply.spec_rev(), SPEC_REV_3_0);
        assert!(reply.power_role());
        assert!(reply.data_role());
        assert_eq!(reply.num_data_objs(), 0);
    }

    #[test]
    fn header_fields_pack_into_the_right_bits() {
        let mut header = Header(0);
        header.set_msg_type(0x1f);
        assert_eq!(header.0, 0x001f);
        header = Header(0);
        header.set_msg_id(7);
        assert_eq!(header.0, 7 << 9);
        header = Header(0);
        header.set_ext(true);
        assert_eq!(header.0, 0x8000);
    }
}
