// Builtin snippet table
//
// Pre-written interaction sequences insertable from a command block with
// `_b <name>`. The table is static data; adding a snippet never touches
// parser or compiler logic.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static BUILTINS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Stops compilation of the current block, used for testing
    m.insert("nil", "");

    // Enter Juniper configuration mode
    m.insert(
        "juniper-configure",
        r##"
expect {
    "*assword:" { send_error "$hostname Authentication failed\n"; exit 1 }
    "0%" {
        send "cli\n"
        expect ">"
    }
    ">"
}
send "configure\n"
expect "#"
"##,
    );

    // Reset a Juniper root password
    m.insert(
        "juniper-password-reset",
        r##"
send "set system root-authentication plain-text-password\n";
expect {
	"New password" { send "{{juniper_password}}\n"; }
	"error" { send_error "Juniper password error\n"; exit 1	}
}
expect {
	"Retype new password" { send "{{juniper_password}}\n"; }
	"error" { send_error "Juniper password error\n"; exit 1	}
}
expect "#";
"##,
    );

    // Exit Juniper without committing changes
    m.insert(
        "juniper-exit-nocommit",
        r#"
send "exit\n"
expect {
    "Exit with uncommitted changes?" { send "yes\n"; expect ">" }
    ">"
}
send "exit\n"
expect {
	"0%" { send "exit\n" }
	eof {}
}
"#,
    );

    // Attempt a Juniper commit, roll back and alert on failure
    m.insert(
        "juniper-commit-rollback-failed",
        r#"
set oldTimeout $timeout
set timeout 30
send "commit\n"
expect {
	-re "error|failed" {
		send "rollback\n"
		expect "*#"
		send "exit\n"
		expect "*>"
		send "exit\n"
		send_error "$hostname failed to commit changes"
		exit 1
	}
	"commit complete"
}
set timeout $oldTimeout
"#,
    );

    // Enter Cisco enable exec mode
    m.insert(
        "cisco-enable-mode",
        r##"
expect {
	default { send_error "$hostname Enable Mode Failed - Check Password\n"; exit 1 }
	"#" {}
	">" {
		send "enable\n"
		expect "*assword"
		send "$enablepassword\n"
		expect {
			"% Access denied" {
				send_error "$hostname Enable Mode Failed - Check Password\n"
				exit 1
			}
			"#"
		}
	}
}
"##,
    );

    // Exit configure mode, wr mem, then continue
    m.insert(
        "cisco-end-wrmem",
        r##"
send "end\n"
expect "#"
set oldTimeout $timeout
set timeout 30
send "wr mem\n"
expect {
	default {
		send "exit\n"
		send_error "$hostname failed to save configuration"
		exit 1
	}
	"\[OK\]"
}
set timeout $oldTimeout
"##,
    );

    // Set Cisco terminal length to 0
    m.insert(
        "cisco-show-all",
        r##"
send "terminal length 0\n"
expect "#"
"##,
    );

    m
});

/// Look up a builtin snippet by name
pub fn lookup(name: &str) -> Option<&'static str> {
    BUILTINS.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("nil"), Some(""));
        assert!(lookup("cisco-enable-mode").unwrap().contains("enable"));
        assert_eq!(lookup("does-not-exist"), None);
    }
}
