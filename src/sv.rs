use gnss::prelude::{Constellation, SV};

/// Resolves a satellite from its constellation and PRN number,
/// as transmitted by receivers. SBAS PRNs (120..=158) and QZSS PRNs
/// (193..=202) are expressed in the RINEX convention (S20, J01..).
pub fn resolve(constellation: Constellation, prn: u16) -> Option<SV> {
    let prn = match constellation {
        Constellation::GPS if (1..=32).contains(&prn) => prn,
        Constellation::Glonass if (1..=27).contains(&prn) => prn,
        Constellation::Galileo if (1..=36).contains(&prn) => prn,
        Constellation::BeiDou if (1..=63).contains(&prn) => prn,
        Constellation::IRNSS if (1..=14).contains(&prn) => prn,
        Constellation::QZSS if (193..=202).contains(&prn) => prn - 192,
        Constellation::SBAS if (120..=158).contains(&prn) => prn - 100,
        _ => return None,
    };
    Some(SV {
        constellation,
        prn: prn as u8,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(Constellation::GPS, 1, Some(1))]
    #[case(Constellation::GPS, 33, None)]
    #[case(Constellation::GPS, 0, None)]
    #[case(Constellation::Glonass, 24, Some(24))]
    #[case(Constellation::QZSS, 193, Some(1))]
    #[case(Constellation::QZSS, 1, None)]
    #[case(Constellation::SBAS, 131, Some(31))]
    #[case(Constellation::BeiDou, 60, Some(60))]
    fn prn_ranges(#[case] constellation: Constellation, #[case] prn: u16, #[case] expected: Option<u8>) {
        let sv = resolve(constellation, prn);
        assert_eq!(sv.map(|sv| sv.prn), expected);
        if let Some(sv) = sv {
            assert_eq!(sv.constellation, constellation);
        }
    }
}
