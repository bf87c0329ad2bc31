use std::io::{self, stdin, Write};

#[macro_export]
macro_rules! check {
  ($cond: expr, $prompt: literal $(, $( $params: expr $(,)? )* )? ) => {
    if !$cond {
      ::tracing::warn!($prompt $(, $( $params, )* )?);
    }
  }
}

pub fn read_from_stdin(hidden: bool, prompt: &str) -> io::Result<String> {
    if hidden {
        rpassword::prompt_password(prompt)
    } else {
        eprint!("{}", prompt);
        io::stderr().flush()?;

        let mut read = String::new();
        stdin().read_line(&mut read)?;

        Ok(read.trim_end_matches(['\r', '\n']).to_owned())
    }
}
