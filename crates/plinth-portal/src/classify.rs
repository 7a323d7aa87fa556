// Probe paths used by Apple, Android/Chrome, Windows, Firefox and the Linux
// network managers to decide whether the network has a captive portal.
// Answering one with a redirect is what pops the "sign in" sheet.
const DETECTION_PATHS: &[&str] = &[
    "/hotspot-detect.html",
    "/library/test/success.html",
    "/captive.apple.com",
    "/generate_204",
    "/gen_204",
    "/connectivitycheck.gstatic.com",
    "/connecttest.txt",
    "/ncsi.txt",
    "/redirect",
    "/canonical.html",
    "/success.txt",
    "/check_network_status.txt",
    "/nm-check-status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Intercept,
    Passthrough,
}

// Query stripped, remainder lowercased, then exact match only; near-misses
// pass through.
pub fn classify(raw_path: &str) -> Decision {
    let path = match raw_path.split_once('?') {
        Some((before, _)) => before,
        None => raw_path,
    };
    let path = path.to_ascii_lowercase();
    if DETECTION_PATHS.contains(&path.as_str()) {
        Decision::Intercept
    } else {
        Decision::Passthrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_detection_path_is_intercepted() {
        for path in DETECTION_PATHS {
            assert_eq!(classify(path), Decision::Intercept, "path {path}");
        }
    }

    #[test]
    fn query_string_is_ignored() {
        assert_eq!(classify("/generate_204?foo=bar"), Decision::Intercept);
        assert_eq!(classify("/hotspot-detect.html?"), Decision::Intercept);
        assert_eq!(
            classify("/connecttest.txt?n=1628239428702"),
            Decision::Intercept
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify("/Hotspot-Detect.html"), Decision::Intercept);
        assert_eq!(classify("/GENERATE_204"), Decision::Intercept);
        assert_eq!(classify("/Library/Test/Success.html"), Decision::Intercept);
    }

    #[test]
    fn near_misses_pass_through() {
        assert_eq!(classify("/hotspot-detect.htm"), Decision::Passthrough);
        assert_eq!(classify("/generate_2044"), Decision::Passthrough);
        assert_eq!(classify("/a/generate_204"), Decision::Passthrough);
        assert_eq!(classify("/redirect/extra"), Decision::Passthrough);
    }

    #[test]
    fn ordinary_paths_pass_through() {
        assert_eq!(classify("/"), Decision::Passthrough);
        assert_eq!(classify(""), Decision::Passthrough);
        assert_eq!(classify("/index.html"), Decision::Passthrough);
        assert_eq!(classify("/api/status?verbose=1"), Decision::Passthrough);
    }
}
