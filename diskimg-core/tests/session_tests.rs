use diskimg_core::{fully_mounted, Config, ImageSession, ImgError, UnmountPolicy};
use diskimg_error::AttachmentError;
use diskimg_hal::{CommandOutput, FakeHal, Invocation};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

const KPARTX_OUTPUT: &str = "add map loop3p1 (253:0): 0 2048 linear 7:3 2048\n\
                             add map loop3p2 (253:1): 0 4096 linear 7:3 4096\n";

fn fake_image() -> FakeHal {
    let hal = FakeHal::new();
    hal.push_output("kpartx", CommandOutput::success().with_stdout(KPARTX_OUTPUT));
    hal
}

fn config_in(parent: &Path) -> Config {
    Config {
        workdir_parent: Some(parent.to_path_buf()),
        unmount: UnmountPolicy {
            backoff_ms: 0,
            ..UnmountPolicy::default()
        },
        ..Config::default()
    }
}

/// `+target` for each mount and `-target` for each plain or lazy unmount.
fn mount_events(invocations: &[Invocation]) -> Vec<String> {
    invocations
        .iter()
        .filter_map(|inv| {
            let target = inv.args.last()?;
            match inv.program.as_str() {
                "mount" => Some(format!("+{target}")),
                "umount" => Some(format!("-{target}")),
                _ => None,
            }
        })
        .collect()
}

fn assert_palindrome(events: &[String]) {
    assert_eq!(events.len() % 2, 0, "unbalanced events: {events:?}");
    let half = events.len() / 2;
    for (mounted, unmounted) in events[..half].iter().zip(events[half..].iter().rev()) {
        assert_eq!(&mounted[1..], &unmounted[1..], "events: {events:?}");
        assert!(mounted.starts_with('+') && unmounted.starts_with('-'));
    }
}

#[test]
fn full_session_is_a_palindrome() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();

    let root = fully_mounted(&hal, "disk.img", &config_in(parent.path()), |root| {
        Ok::<_, ImgError>(root.to_path_buf())
    })
    .unwrap();

    let events = mount_events(&hal.invocations());
    assert_eq!(
        events,
        vec![
            format!("+{}", root.display()),
            format!("+{}", root.join("boot").display()),
            format!("-{}", root.join("boot").display()),
            format!("-{}", root.display()),
        ]
    );
    assert_palindrome(&events);
}

#[test]
fn chroot_layer_is_nested_inside_the_partition_mounts() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();

    let session = ImageSession::open(&hal, "disk.img", &config_in(parent.path())).unwrap();
    let root = session.root().to_path_buf();
    let status = session.chroot(&["/bin/true".to_string()]).unwrap();
    session.close();

    assert_eq!(status, 0);
    let events = mount_events(&hal.invocations());
    assert_eq!(events.len(), 16);
    assert_palindrome(&events);

    let lines = hal.command_lines();
    let chroot_at = lines
        .iter()
        .position(|l| l == &format!("chroot {} /bin/true", root.display()))
        .unwrap();
    let last_mount = lines.iter().rposition(|l| l.starts_with("mount ")).unwrap();
    let first_umount = lines.iter().position(|l| l.starts_with("umount ")).unwrap();
    assert!(last_mount < chroot_at && chroot_at < first_umount);
    assert_eq!(lines[lines.len() - 2], "kpartx -d disk.img");
    assert_eq!(lines[lines.len() - 1], "sync");
}

#[test]
fn teardown_releases_everything() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();

    let session = ImageSession::open(&hal, "disk.img", &config_in(parent.path())).unwrap();
    let root = session.root().to_path_buf();
    assert!(root.is_dir());
    assert_ne!(session.mounts()[0].source(), session.mounts()[1].source());
    assert_eq!(
        hal.mounted_paths(),
        vec![root.clone(), root.join("boot")]
    );
    assert_eq!(hal.attached_images(), vec![PathBuf::from("disk.img")]);

    session.close();

    assert!(hal.mounted_paths().is_empty());
    assert!(hal.attached_images().is_empty());
    assert!(!root.exists());
}

#[test]
fn boot_mount_failure_unwinds_root_and_loop() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();
    hal.push_output("mount", CommandOutput::success());
    hal.push_output("mount", CommandOutput::failure(32, "can't find in /etc/fstab"));

    let err = ImageSession::open(&hal, "disk.img", &config_in(parent.path())).unwrap_err();

    match err {
        ImgError::Mount(mount_err) => {
            assert_eq!(mount_err.device, "/dev/mapper/loop3p1");
            assert_eq!(mount_err.exit_code(), Some(32));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let lines = hal.command_lines();
    assert_eq!(lines.len(), 6);
    assert!(lines[3].starts_with("umount "));
    assert_eq!(lines[4], "kpartx -d disk.img");
    assert_eq!(lines[5], "sync");
    assert!(hal.mounted_paths().is_empty());
    assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
}

#[test]
fn root_mount_failure_detaches_without_unmounting() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();
    hal.push_output("mount", CommandOutput::failure(32, "wrong fs type"));

    let err = ImageSession::open(&hal, "disk.img", &config_in(parent.path())).unwrap_err();

    assert!(matches!(err, ImgError::Mount(_)));
    assert_eq!(hal.count("umount"), 0);
    assert_eq!(hal.count("kpartx"), 2);
    assert!(hal.attached_images().is_empty());
    assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
}

#[test]
fn unrecognised_kpartx_output_leaves_nothing_behind() {
    let parent = tempfile::tempdir().unwrap();
    let hal = FakeHal::new();
    hal.push_output("kpartx", CommandOutput::success().with_stdout("\n"));

    let err = ImageSession::open(&hal, "disk.img", &config_in(parent.path())).unwrap_err();

    assert!(matches!(
        err,
        ImgError::Attachment(AttachmentError::NoMapping { .. })
    ));
    assert_eq!(hal.command_lines(), vec!["kpartx -a -v disk.img"]);
    assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
}

#[test]
fn busy_boot_partition_does_not_block_the_rest_of_teardown() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();
    for _ in 0..5 {
        hal.push_output("umount", CommandOutput::failure(32, "target is busy"));
    }

    let session = ImageSession::open(&hal, "disk.img", &config_in(parent.path())).unwrap();
    let root = session.root().to_path_buf();
    session.close();

    let umounts: Vec<String> = hal
        .command_lines()
        .into_iter()
        .filter(|l| l.starts_with("umount"))
        .collect();
    let boot = root.join("boot");
    let mut expected = vec![format!("umount {}", boot.display()); 5];
    expected.push(format!("umount -l {}", boot.display()));
    expected.push(format!("umount {}", root.display()));
    assert_eq!(umounts, expected);
    assert_eq!(hal.count("lsof"), 5);
    assert!(hal.attached_images().is_empty());
    assert!(!root.exists());
}

#[test]
fn chroot_failure_still_tears_down() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();
    hal.push_output("chroot", CommandOutput::failure(2, ""));

    let result = fully_mounted(&hal, "disk.img", &config_in(parent.path()), |root| {
        diskimg_core::run_in_root(&hal, root, &["false".to_string()])
    });

    assert_eq!(result.unwrap_err().exit_code(), Some(2));
    assert!(hal.mounted_paths().is_empty());
    assert!(hal.attached_images().is_empty());
}

#[test]
fn panicking_body_still_tears_down() {
    let parent = tempfile::tempdir().unwrap();
    let hal = fake_image();
    let config = config_in(parent.path());

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        fully_mounted(&hal, "disk.img", &config, |_root| -> Result<(), ImgError> {
            panic!("body blew up while the image was mounted");
        })
    }));

    assert!(result.is_err());
    assert!(hal.mounted_paths().is_empty());
    assert!(hal.attached_images().is_empty());
    let lines = hal.command_lines();
    assert_eq!(lines[lines.len() - 2], "kpartx -d disk.img");
    assert_eq!(lines[lines.len() - 1], "sync");
    assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
}
