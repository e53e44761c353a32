use std::time::Duration;

pub static SMALL_DELAY: Duration = Duration::from_millis(200);

pub static EMAIL1: &[u8] = b"Date: Sat, 8 Jul 2023 07:14:29 +0000\r\n\
From: Bob Robert <bob@example.tld>\r\n\
To: Alice Malice <alice@example.tld>\r\n\
Subject: Welcome OoOoO\r\n\
Message-ID: <NTAxNzA2AC47634Y366BAMTY4ODM0MzgzNDgzM@example.tld>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
This is the plain text body of the message. Note the blank line\r\n\
between the header information and the body of the message.";

pub static EMAIL2: &[u8] = b"From: alice@example.tld\r\n\
Subject: second\r\n\
\r\n\
Another tiny message.";
