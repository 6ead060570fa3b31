use super::*;

const ZOOM_DUMP: &str = "WINDOW MANAGER WINDOWS (dumpsys window windows)\n  \
    mCurrentFocus=Window{5e3b2a1 u0 us.zoom.videomeetings/com.zipow.videobox.LauncherActivity}\n  \
    mFocusedApp=ActivityRecord{1a2b3c u0 us.zoom.videomeetings/com.zipow.videobox.LauncherActivity t12}\n";

#[test]
fn test_extract_prefers_current_focus() {
    assert_eq!(
        extract_focus_token(ZOOM_DUMP).as_deref(),
        Some("us.zoom.videomeetings/com.zipow.videobox.LauncherActivity")
    );
}

#[test]
fn test_extract_falls_back_to_focused_app() {
    let dump = "  mCurrentFocus=null\n  \
        mFocusedApp=ActivityRecord{77 u0 com.microsoft.skype.teams.ipphone/.MainActivity t3}\n";
    assert_eq!(
        extract_focus_token(dump).as_deref(),
        Some("com.microsoft.skype.teams.ipphone/.MainActivity")
    );
}

#[test]
fn test_extract_takes_last_non_null_line() {
    let dump = "mCurrentFocus=Window{1 u0 com.old.app/.Old}\n\
                mCurrentFocus=Window{2 u0 com.new.app/.New}\n\
                mCurrentFocus=null\n";
    assert_eq!(extract_focus_token(dump).as_deref(), Some("com.new.app/.New"));
}

#[test]
fn test_extract_without_focus_field() {
    assert_eq!(extract_focus_token(""), None);
    assert_eq!(extract_focus_token("nothing to see here"), None);
    assert_eq!(extract_focus_token("mCurrentFocus=null\nmFocusedApp=null"), None);
}

#[test]
fn test_extract_window_title_without_activity() {
    let dump = "mCurrentFocus=Window{1f u0 ZoomRooms}";
    let token = extract_focus_token(dump);
    assert_eq!(classify_token(token.as_deref()), SuiteTarget::Zoom);
}

#[test]
fn test_zoom_matches_any_case() {
    for token in ["us.zoom.videomeetings/.A", "com.ZOOM.rooms/.Main", "x.ZoOm/y"] {
        assert_eq!(classify_token(Some(token)), SuiteTarget::Zoom);
    }
}

#[test]
fn test_teams_and_mtr() {
    assert_eq!(
        classify_token(Some("com.microsoft.skype.teams.ipphone/.MainActivity")),
        SuiteTarget::Teams
    );
    assert_eq!(
        classify_token(Some("com.microsoft.mtr.shell/.Home")),
        SuiteTarget::Teams
    );
}

#[test]
fn test_device_mode_wins_over_teams_token() {
    // The companion app's package also contains "teams".
    assert_eq!(
        classify_token(Some("com.microsoft.teams.frogger/.DeviceModeActivity")),
        SuiteTarget::DeviceMode
    );
    assert_eq!(
        classify_token(Some("com.vendor.devicemode/.Main")),
        SuiteTarget::DeviceMode
    );
}

#[test]
fn test_unmatched_or_missing_is_all_suites() {
    assert_eq!(classify_token(None), SuiteTarget::AllSuites);
    assert_eq!(
        classify_token(Some("com.android.launcher3/.Launcher")),
        SuiteTarget::AllSuites
    );
}

#[test]
fn test_suite_targets() {
    assert_eq!(SuiteTarget::Zoom.pytest_target(), "testcases/tests_zoom");
    assert_eq!(SuiteTarget::Teams.pytest_target(), "testcases/tests_mtr");
    assert_eq!(
        SuiteTarget::DeviceMode.pytest_target(),
        "testcases/tests_device_mode"
    );
    assert_eq!(SuiteTarget::AllSuites.pytest_target(), "testcases");
    assert!(SuiteTarget::Zoom.uses_bugreport_fixtures());
    assert!(!SuiteTarget::AllSuites.uses_bugreport_fixtures());
}
