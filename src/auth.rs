use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

/// Reads the password for an encrypt or decrypt run.
///
/// When `confirm` is set and the password comes from an interactive prompt,
/// it has to be typed twice.
pub fn read_password(confirm: bool) -> Result<Zeroizing<String>> {
    //  Environment Variable
    //  FILECRYPT_PASSWORD="supersecret" filecrypt decrypt ...
    if let Ok(pw) = std::env::var("FILECRYPT_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    //  stdin (Pipeline)
    //  printf "%s" "$SECRET" | filecrypt encrypt ...
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
        bail!("No password provided");
    }

    //  Interactive (TTY)
    let pw = Zeroizing::new(rpassword::prompt_password("Password: ")?);
    if pw.is_empty() {
        bail!("password cannot be empty");
    }

    if confirm {
        let again = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);
        if *pw != *again {
            bail!("passwords do not match");
        }
    }

    Ok(pw)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
